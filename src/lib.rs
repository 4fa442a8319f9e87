//! # Script Bridge
//!
//! A bidirectional bridge between native Rust objects and an embedded,
//! dynamically-typed scripting engine exposed through a C-level API.
//!
//! ## Features
//!
//! - **String Bridge**: lossless UTF-8 conversion with balanced engine string handles
//! - **Value Coercion**: checked conversion of opaque script values to native types
//! - **Exception Bridge**: engine exceptions captured as typed native errors, and back
//! - **Native Object Wrapper**: native ownership moved into a script object's private slot
//! - **Class Descriptors**: property hooks, static functions and finalizers for native classes
//! - **Accessors**: validated property, element and `length` access, `instanceof` checks
//!
//! ## Architecture Design
//!
//! The engine is reached only through the [`EngineApi`] trait, which mirrors the
//! embedding API of the runtime (opaque handles plus an exception out-parameter).
//! Every engine call is followed by [`ExceptionSlot::check`]; when the slot is set,
//! the returned value is discarded and the thrown value surfaces as a
//! [`NativeException`]. [`MemoryEngine`] is a deterministic in-memory implementation.
//!
//! ### Example
//!
//! ```
//! use script_bridge::{accessors, wrapper, ClassBuilder, EngineApi, MemoryEngine};
//!
//! struct Counter(u32);
//!
//! let mut engine = MemoryEngine::new();
//! let class = ClassBuilder::new("Counter")
//!     .getter(|engine, object, name| {
//!         if name != "value" {
//!             return Ok(None);
//!         }
//!         let value = wrapper::validated_unwrap::<Counter>(engine, object)?.0;
//!         Ok(Some(engine.make_number(value as f64)))
//!     })
//!     .build(&mut engine);
//!
//! let counter = wrapper::wrap(&mut engine, class, Counter(3), None).unwrap();
//! assert_eq!(accessors::number_property(&mut engine, counter, "value").unwrap(), 3.0);
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: engine boundary and the in-memory reference engine
//! - [`string_bridge`]: string conversion
//! - [`coerce`]: value coercion
//! - [`exception`]: exception bridge and error taxonomy
//! - [`wrapper`]: native object wrapping
//! - [`class`]: class descriptor builder
//! - [`accessors`]: property and element accessors
//! - [`registry`]: global class registration

/// Engine boundary: handles, exception slot, callbacks and the `EngineApi` trait
pub mod engine;
/// UTF-8 conversion between native strings and engine strings
pub mod string_bridge;
/// Checked conversion of script values to native types
pub mod coerce;
/// Native errors, captured script exceptions and conversion between them
pub mod exception;
/// Private-slot ownership of native objects
pub mod wrapper;
/// Class definitions for native-backed script objects
pub mod class;
/// Validated property and element access
pub mod accessors;
/// Argument count guards for native entry points
pub mod arguments;
/// Global class installation and the class registry
pub mod registry;
/// Configuration loading
pub mod config;
/// Logging initialisation
pub mod logging;

mod macros;

pub use arguments::{validate_argument_count, validate_argument_range, ArgumentCount};
pub use class::{native_function, ClassBuilder, ClassDefinition, StaticFunction};
pub use config::{BridgeConfig, ConfigError, ConfigResult, HeapConfig, LogLevel, LoggingConfig};
pub use engine::{
    ClassRef, EngineApi, ExceptionSlot, MemoryEngine, ObjectRef, PropertyAttributes, StringHandle,
    Value, ValueKind,
};
pub use exception::{BridgeResult, CapturedException, ErrorKind, NativeException};
pub use registry::{register_global_class, ClassRegistry};
pub use wrapper::{PrivateSlot, SlotState};
