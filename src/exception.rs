//! 异常桥接
//!
//! 原生错误与脚本异常之间的双向转换：
//!
//! - 引擎 → 原生：引擎调用写入 [`ExceptionSlot`] 后立即捕获为 [`NativeException`]
//! - 原生 → 引擎：[`to_script_error`] 把原生错误渲染为脚本可见的错误对象；
//!   若错误本身来自脚本，则原样返回被抛出的值

use std::fmt;

use thiserror::Error;

use crate::arguments::ArgumentCount;
use crate::engine::{EngineApi, ExceptionSlot, ObjectRef, Value};
use crate::string_bridge;

/// 从引擎捕获的脚本异常
///
/// `value` 是被抛出的原始值，保持不变，以便重新抛回脚本时保持同一性。
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedException {
    value: Value,
    message: String,
}

impl CapturedException {
    pub fn value(&self) -> Value {
        self.value
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CapturedException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// 原生异常
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NativeException {
    /// 原生入口的参数数量不符合要求
    #[error("Invalid arguments: expected {expected}, got {actual}")]
    Argument {
        expected: ArgumentCount,
        actual: usize,
    },

    /// 脚本值不满足期望的形状
    #[error("{0}")]
    TypeMismatch(String),

    /// 引擎 API 调用报告了异常
    #[error("{exception}")]
    Engine {
        operation: &'static str,
        exception: CapturedException,
    },

    /// 被调用的脚本函数抛出了异常
    #[error("{0}")]
    Script(CapturedException),

    /// 只带消息的原生错误
    #[error("{0}")]
    Message(String),
}

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Argument,
    TypeMismatch,
    Engine,
    CapturedScript,
    Native,
}

impl NativeException {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NativeException::Argument { .. } => ErrorKind::Argument,
            NativeException::TypeMismatch(_) => ErrorKind::TypeMismatch,
            NativeException::Engine { .. } => ErrorKind::Engine,
            NativeException::Script(_) => ErrorKind::CapturedScript,
            NativeException::Message(_) => ErrorKind::Native,
        }
    }

    /// 若错误携带被捕获的脚本值则返回它
    pub fn script_value(&self) -> Option<Value> {
        match self {
            NativeException::Engine { exception, .. } | NativeException::Script(exception) => {
                Some(exception.value())
            }
            _ => None,
        }
    }
}

pub type BridgeResult<T> = Result<T, NativeException>;

impl ExceptionSlot {
    /// 引擎调用之后的统一检查
    ///
    /// 槽位被设置时丢弃 `returned`，无论它看起来是否有效。
    pub fn check<T>(
        &mut self,
        engine: &mut dyn EngineApi,
        operation: &'static str,
        returned: T,
    ) -> BridgeResult<T> {
        match capture_from_engine(engine, self) {
            Some(exception) => Err(NativeException::Engine {
                operation,
                exception,
            }),
            None => Ok(returned),
        }
    }
}

/// 取出槽位中的异常值并生成消息
///
/// 值在任何后续引擎调用之前被取出。
pub fn capture_from_engine(
    engine: &mut dyn EngineApi,
    exception: &mut ExceptionSlot,
) -> Option<CapturedException> {
    let value = exception.take()?;
    let message = describe(engine, value);
    tracing::trace!(
        target: "script_bridge::exception",
        value = value.raw(),
        %message,
        "Captured script exception"
    );
    Some(CapturedException { value, message })
}

fn describe(engine: &mut dyn EngineApi, value: Value) -> String {
    let mut nested = ExceptionSlot::new();
    match engine.to_string_copy(value, &mut nested) {
        Some(string) if !nested.is_set() => string_bridge::take_native(engine, string),
        Some(string) => {
            engine.string_release(string);
            "Unknown script exception".to_string()
        }
        None => "Unknown script exception".to_string(),
    }
}

/// 把原生错误渲染为脚本值
///
/// 捕获自脚本的错误原样返回；其余错误构造新的引擎错误对象。
pub fn to_script_error(engine: &mut dyn EngineApi, error: &NativeException) -> Value {
    if let Some(value) = error.script_value() {
        return value;
    }
    error_value(engine, &error.to_string())
}

/// 从任意原生错误构造脚本错误对象
pub fn error_from_std(engine: &mut dyn EngineApi, error: &dyn std::error::Error) -> Value {
    error_value(engine, &error.to_string())
}

/// 从消息构造脚本错误对象
pub fn make_error(engine: &mut dyn EngineApi, message: &str) -> BridgeResult<ObjectRef> {
    let mut exception = ExceptionSlot::new();
    let created = string_bridge::with_engine_string(engine, message, |engine, string| {
        engine.make_error(string, &mut exception)
    });
    exception
        .check(engine, "make_error", created)?
        .ok_or_else(|| NativeException::Message(message.to_string()))
}

fn error_value(engine: &mut dyn EngineApi, message: &str) -> Value {
    match make_error(engine, message) {
        Ok(object) => object.into(),
        // 构造错误对象本身失败时，抛出引擎给出的那个异常
        Err(failure) => match failure.script_value() {
            Some(value) => value,
            None => string_bridge::value_for_string(engine, message),
        },
    }
}

/// 在原生回调出口把错误写入引擎的异常槽
pub fn throw(engine: &mut dyn EngineApi, error: &NativeException, exception: &mut ExceptionSlot) {
    let value = to_script_error(engine, error);
    exception.set(value);
}
