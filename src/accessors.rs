//! 属性与元素访问
//!
//! 建立在值转换和异常桥接之上的便捷操作。每次引擎调用之后立即检查异常槽，
//! 缺失或 `undefined` 的值在这里一律视为错误，不做默认填充。

use crate::coerce;
use crate::engine::{EngineApi, ExceptionSlot, ObjectRef, PropertyAttributes, Value, ValueKind};
use crate::exception::{capture_from_engine, BridgeResult, NativeException};
use crate::string_bridge::with_engine_string;

/// 读取命名属性
pub fn property(engine: &mut dyn EngineApi, object: ObjectRef, name: &str) -> BridgeResult<Value> {
    let mut exception = ExceptionSlot::new();
    let value = with_engine_string(engine, name, |engine, key| {
        engine.get_property(object, key, &mut exception)
    });
    exception.check(engine, "get_property", value)
}

/// 读取必须为对象的属性
pub fn object_property(
    engine: &mut dyn EngineApi,
    object: ObjectRef,
    name: &str,
    message: Option<&str>,
) -> BridgeResult<ObjectRef> {
    let value = property(engine, object, name)?;
    if engine.value_kind(value) == ValueKind::Undefined {
        return Err(NativeException::TypeMismatch(match message {
            Some(message) => message.to_string(),
            None => format!("Object property '{}' is undefined", name),
        }));
    }
    let fallback = format!("Object property '{}' is not an object", name);
    coerce::to_object(engine, value, Some(message.unwrap_or(&fallback)))
}

/// 读取必须为字符串的属性
pub fn string_property(
    engine: &mut dyn EngineApi,
    object: ObjectRef,
    name: &str,
) -> BridgeResult<String> {
    let value = property(engine, object, name)?;
    coerce::to_string_validated(engine, value, Some(name))
}

/// 读取必须为数字的属性
pub fn number_property(
    engine: &mut dyn EngineApi,
    object: ObjectRef,
    name: &str,
) -> BridgeResult<f64> {
    let value = property(engine, object, name)?;
    if engine.value_kind(value) != ValueKind::Number {
        return Err(NativeException::TypeMismatch(format!(
            "Object property '{}' is not a number",
            name
        )));
    }
    coerce::to_number(engine, value)
}

/// 读取下标处必须为对象的元素
pub fn element_at(
    engine: &mut dyn EngineApi,
    object: ObjectRef,
    index: u32,
) -> BridgeResult<ObjectRef> {
    let mut exception = ExceptionSlot::new();
    let value = engine.get_property_at_index(object, index, &mut exception);
    let value = exception.check(engine, "get_property_at_index", value)?;
    coerce::to_object(engine, value, None)
}

/// 读取数值型的 `length` 属性
pub fn array_length(engine: &mut dyn EngineApi, object: ObjectRef) -> BridgeResult<usize> {
    let value = property(engine, object, "length")?;
    if engine.value_kind(value) != ValueKind::Number {
        return Err(NativeException::TypeMismatch(
            "Missing property 'length'".to_string(),
        ));
    }
    let length = coerce::to_number(engine, value)?;
    if !length.is_finite() || length < 0.0 || length.fract() != 0.0 {
        return Err(NativeException::TypeMismatch(format!(
            "Invalid array length: {}",
            length
        )));
    }
    Ok(length as usize)
}

/// 检查值是否为某个全局构造函数的实例
pub fn instance_of(
    engine: &mut dyn EngineApi,
    value: Value,
    constructor_name: &str,
) -> BridgeResult<bool> {
    let global = engine.global_object();
    let constructor = property(engine, global, constructor_name)?;
    let constructor = coerce::to_object(
        engine,
        constructor,
        Some(format!("'{}' is not a constructor", constructor_name).as_str()),
    )?;

    let mut exception = ExceptionSlot::new();
    let result = engine.is_instance_of(value, constructor, &mut exception);
    exception.check(engine, "is_instance_of", result)
}

pub fn set_property(
    engine: &mut dyn EngineApi,
    object: ObjectRef,
    name: &str,
    value: Value,
    attributes: PropertyAttributes,
) -> BridgeResult<()> {
    let mut exception = ExceptionSlot::new();
    with_engine_string(engine, name, |engine, key| {
        engine.set_property(object, key, value, attributes, &mut exception)
    });
    exception.check(engine, "set_property", ())
}

pub fn set_element(
    engine: &mut dyn EngineApi,
    object: ObjectRef,
    index: u32,
    value: Value,
) -> BridgeResult<()> {
    let mut exception = ExceptionSlot::new();
    engine.set_property_at_index(object, index, value, &mut exception);
    exception.check(engine, "set_property_at_index", ())
}

/// 调用脚本函数；被调用方抛出的值以 [`NativeException::Script`] 返回
pub fn call_function(
    engine: &mut dyn EngineApi,
    function: ObjectRef,
    this: Option<ObjectRef>,
    arguments: &[Value],
) -> BridgeResult<Value> {
    let mut exception = ExceptionSlot::new();
    let result = engine.call_function(function, this, arguments, &mut exception);
    match capture_from_engine(engine, &mut exception) {
        Some(thrown) => Err(NativeException::Script(thrown)),
        None => Ok(result),
    }
}

/// 读取必须为函数的属性
pub fn function_property(
    engine: &mut dyn EngineApi,
    object: ObjectRef,
    name: &str,
) -> BridgeResult<ObjectRef> {
    object_property(
        engine,
        object,
        name,
        Some(format!("'{}' is not a function", name).as_str()),
    )
}

/// 检查属性是否存在，包括原型链
pub fn has_property(engine: &mut dyn EngineApi, object: ObjectRef, name: &str) -> bool {
    with_engine_string(engine, name, |engine, key| engine.has_property(object, key))
}

/// 调用对象上的方法
pub fn call_method(
    engine: &mut dyn EngineApi,
    object: ObjectRef,
    name: &str,
    arguments: &[Value],
) -> BridgeResult<Value> {
    let function = function_property(engine, object, name)?;
    call_function(engine, function, Some(object), arguments)
}
