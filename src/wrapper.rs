//! 原生对象包装
//!
//! 把原生对象的所有权转移给脚本对象的私有槽，并在引擎回收该脚本对象时
//! 通过终结回调释放原生对象。
//!
//! 每个私有槽的状态机：
//!
//! ```text
//! Constructed(空) --store--> Wrapped(原生对象) --finalize--> Finalized(已销毁)
//! ```
//!
//! `Finalized` 是终态，之后的任何读取都返回 `None`。

use std::any::{type_name, Any};
use std::fmt;

use crate::engine::{ClassRef, EngineApi, ExceptionSlot, NativeBox, ObjectRef};
use crate::exception::{BridgeResult, NativeException};

/// 私有槽状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Constructed,
    Wrapped,
    Finalized,
}

enum SlotContents {
    Empty,
    Native(NativeBox),
    Finalized,
}

/// 脚本对象的私有槽
///
/// 唯一的写入者是本模块：`store` 在包装时写入一次，`finalize` 在回收时清空一次。
pub struct PrivateSlot {
    contents: SlotContents,
}

impl PrivateSlot {
    pub fn new() -> Self {
        Self {
            contents: SlotContents::Empty,
        }
    }

    pub fn with_native(native: NativeBox) -> Self {
        Self {
            contents: SlotContents::Native(native),
        }
    }

    pub fn state(&self) -> SlotState {
        match self.contents {
            SlotContents::Empty => SlotState::Constructed,
            SlotContents::Native(_) => SlotState::Wrapped,
            SlotContents::Finalized => SlotState::Finalized,
        }
    }

    /// 存入原生对象；只允许在 `Constructed` 状态下调用
    pub fn store(&mut self, native: NativeBox) -> BridgeResult<()> {
        match self.state() {
            SlotState::Constructed => {
                self.contents = SlotContents::Native(native);
                Ok(())
            }
            SlotState::Wrapped => Err(NativeException::Message(
                "Private slot already holds a native object".to_string(),
            )),
            SlotState::Finalized => Err(NativeException::Message(
                "Private slot has been finalized".to_string(),
            )),
        }
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        match &self.contents {
            SlotContents::Native(native) => native.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        match &mut self.contents {
            SlotContents::Native(native) => native.downcast_mut::<T>(),
            _ => None,
        }
    }

    /// 销毁原生对象并进入终态
    ///
    /// 返回是否真的销毁了一个原生对象。重复调用是无操作。
    pub fn finalize(&mut self) -> bool {
        match std::mem::replace(&mut self.contents, SlotContents::Finalized) {
            SlotContents::Native(native) => {
                drop(native);
                true
            }
            SlotContents::Empty => false,
            SlotContents::Finalized => {
                tracing::warn!(
                    target: "script_bridge::wrapper",
                    "Finalize invoked on an already finalized slot"
                );
                false
            }
        }
    }
}

impl Default for PrivateSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PrivateSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateSlot")
            .field("state", &self.state())
            .finish()
    }
}

/// 默认终结回调：释放私有槽中拥有的原生对象
pub fn release_native(slot: &mut PrivateSlot) {
    if slot.finalize() {
        tracing::debug!(target: "script_bridge::wrapper", "Released wrapped native object");
    }
}

/// 把原生对象包装为指定类的脚本对象
///
/// 原生对象的所有权随之转移给返回的脚本对象。
pub fn wrap<T: Any>(
    engine: &mut dyn EngineApi,
    class: ClassRef,
    native: T,
    prototype: Option<ObjectRef>,
) -> BridgeResult<ObjectRef> {
    let mut exception = ExceptionSlot::new();
    let created = engine.make_object(Some(class), Some(Box::new(native)), &mut exception);
    let object = exception
        .check(engine, "make_object", created)?
        .ok_or_else(|| NativeException::Message("Engine did not create an object".to_string()))?;

    if let Some(prototype) = prototype {
        engine.set_prototype(object, prototype.into());
    }

    tracing::debug!(
        target: "script_bridge::wrapper",
        native = type_name::<T>(),
        class = class.raw(),
        object = object.as_value().raw(),
        "Wrapped native object"
    );
    Ok(object)
}

/// 读取脚本对象包装的原生对象
///
/// 返回的引用借用了引擎，因此不能跨越任何可能重入引擎的调用。
pub fn unwrap<T: Any>(engine: &dyn EngineApi, object: ObjectRef) -> Option<&T> {
    engine.private_slot(object)?.get::<T>()
}

pub fn unwrap_mut<T: Any>(engine: &mut dyn EngineApi, object: ObjectRef) -> Option<&mut T> {
    engine.private_slot_mut(object)?.get_mut::<T>()
}

/// 与 [`unwrap`] 相同，但在对象没有包装 `T` 时返回类型错误
pub fn validated_unwrap<T: Any>(engine: &dyn EngineApi, object: ObjectRef) -> BridgeResult<&T> {
    unwrap::<T>(engine, object).ok_or_else(|| {
        NativeException::TypeMismatch(format!(
            "Object does not wrap a native '{}'",
            type_name::<T>()
        ))
    })
}
