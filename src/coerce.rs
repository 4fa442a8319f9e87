//! 值转换
//!
//! 把不透明的脚本值转换为原生类型。每个转换先做显式的运行时类型检查，
//! 类型不符时返回 [`NativeException::TypeMismatch`]，绝不静默强制转换。

use crate::accessors;
use crate::engine::{EngineApi, ExceptionSlot, ObjectRef, Value, ValueKind};
use crate::exception::{BridgeResult, NativeException};
use crate::string_bridge;

pub fn to_object(
    engine: &mut dyn EngineApi,
    value: Value,
    message: Option<&str>,
) -> BridgeResult<ObjectRef> {
    let mut exception = ExceptionSlot::new();
    let object = engine.to_object(value, &mut exception);
    exception
        .check(engine, "to_object", object)?
        .ok_or_else(|| {
            NativeException::TypeMismatch(message.unwrap_or("Value is not an object.").to_string())
        })
}

pub fn to_number(engine: &mut dyn EngineApi, value: Value) -> BridgeResult<f64> {
    if engine.value_kind(value) != ValueKind::Number {
        return Err(NativeException::TypeMismatch(
            "Value is not a number".to_string(),
        ));
    }
    let mut exception = ExceptionSlot::new();
    let number = engine.to_number(value, &mut exception);
    exception.check(engine, "to_number", number)
}

/// 转换为字符串；`name` 用于参数或属性校验时给出更具体的错误消息
pub fn to_string_validated(
    engine: &mut dyn EngineApi,
    value: Value,
    name: Option<&str>,
) -> BridgeResult<String> {
    let kind = engine.value_kind(value);
    if kind != ValueKind::String {
        let message = match name {
            Some(name) => format!("'{}' must be of type 'string', got '{}'", name, kind),
            None => format!("Value is not a string, got '{}'", kind),
        };
        return Err(NativeException::TypeMismatch(message));
    }

    let mut exception = ExceptionSlot::new();
    let copy = engine.to_string_copy(value, &mut exception);
    let copy = exception.check(engine, "to_string_copy", copy)?;
    copy.map(|string| string_bridge::take_native(engine, string))
        .ok_or_else(|| NativeException::TypeMismatch("Value is not a string".to_string()))
}

pub fn to_boolean(
    engine: &mut dyn EngineApi,
    value: Value,
    name: Option<&str>,
) -> BridgeResult<bool> {
    if engine.value_kind(value) != ValueKind::Boolean {
        let subject = name.unwrap_or("Value");
        return Err(NativeException::TypeMismatch(format!(
            "'{}' must be of type 'boolean'",
            subject
        )));
    }
    Ok(engine.to_boolean(value))
}

/// 数组判定通过全局 `Array` 构造函数完成，而不是本地类型标签
pub fn is_array_like(engine: &mut dyn EngineApi, value: Value) -> BridgeResult<bool> {
    accessors::instance_of(engine, value, "Array")
}
