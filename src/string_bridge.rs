//! 字符串桥接
//!
//! 原生 UTF-8 文本与引擎字符串句柄之间的无损转换。
//! 每个从引擎得到的句柄都要配对释放，除非所有权明确交给调用方。

use crate::engine::{EngineApi, StringHandle, Value};

/// 创建引擎字符串；句柄归调用方所有，用完后必须 `string_release`
pub fn to_engine(engine: &mut dyn EngineApi, text: &str) -> StringHandle {
    engine.string_create(text)
}

/// 读取引擎字符串，不改变其引用计数
pub fn to_native(engine: &dyn EngineApi, string: StringHandle) -> String {
    engine.string_to_utf8(string)
}

/// 读取引擎字符串并释放句柄
pub fn take_native(engine: &mut dyn EngineApi, string: StringHandle) -> String {
    let text = engine.string_to_utf8(string);
    engine.string_release(string);
    text
}

/// 在作用域内使用一个临时引擎字符串，返回前释放
pub fn with_engine_string<R>(
    engine: &mut dyn EngineApi,
    text: &str,
    f: impl FnOnce(&mut dyn EngineApi, StringHandle) -> R,
) -> R {
    let string = engine.string_create(text);
    let result = f(engine, string);
    engine.string_release(string);
    result
}

/// 原生文本对应的脚本字符串值
pub fn value_for_string(engine: &mut dyn EngineApi, text: &str) -> Value {
    with_engine_string(engine, text, |engine, string| engine.make_string(string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;
    use proptest::prelude::*;

    #[test]
    fn test_round_trip_releases_handle() {
        let mut engine = MemoryEngine::new();
        let baseline = engine.live_strings();

        let handle = to_engine(&mut engine, "héllo, 世界");
        assert_eq!(engine.live_strings(), baseline + 1);
        assert_eq!(to_native(&engine, handle), "héllo, 世界");

        engine.string_release(handle);
        assert_eq!(engine.live_strings(), baseline);
    }

    #[test]
    fn test_scoped_string_is_released() {
        let mut engine = MemoryEngine::new();
        let baseline = engine.live_strings();
        let length = with_engine_string(&mut engine, "length", |engine, handle| {
            engine.string_to_utf8(handle).len()
        });
        assert_eq!(length, 6);
        assert_eq!(engine.live_strings(), baseline);
    }

    #[test]
    fn test_retain_keeps_handle_alive() {
        let mut engine = MemoryEngine::new();
        let baseline = engine.live_strings();
        let handle = to_engine(&mut engine, "shared");
        engine.string_retain(handle);
        engine.string_release(handle);
        assert_eq!(to_native(&engine, handle), "shared");
        engine.string_release(handle);
        assert_eq!(engine.live_strings(), baseline);
    }

    #[test]
    fn test_value_for_string_does_not_leak() {
        let mut engine = MemoryEngine::new();
        let baseline = engine.live_strings();
        let value = value_for_string(&mut engine, "realm");
        assert_eq!(engine.live_strings(), baseline);

        let copy = engine
            .to_string_copy(value, &mut crate::engine::ExceptionSlot::new())
            .unwrap();
        assert_eq!(take_native(&mut engine, copy), "realm");
        assert_eq!(engine.live_strings(), baseline);
    }

    proptest! {
        #[test]
        fn string_round_trip(text in "[^\\x00]*") {
            let mut engine = MemoryEngine::new();
            let handle = to_engine(&mut engine, &text);
            prop_assert_eq!(take_native(&mut engine, handle), text);
        }
    }
}
