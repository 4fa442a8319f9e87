//! 类描述符构建
//!
//! 从原生类型的策略构造引擎的类定义记录：名称、属性读写钩子、枚举钩子、
//! 静态函数表和终结回调。类定义构建后不可变，可以反复用来创建实例。
//!
//! 钩子以返回 `BridgeResult` 的 Rust 闭包编写，在这里被适配为引擎的
//! 异常槽约定，原生错误只在这一边界处转换为脚本异常。

use std::fmt;
use std::rc::Rc;

use crate::engine::{
    ClassRef, EngineApi, ExceptionSlot, FinalizeCallback, GetPropertyHook, NativeCallback,
    ObjectRef, PropertyAttributes, PropertyNamesHook, SetPropertyHook, Value,
};
use crate::exception::{self, BridgeResult};
use crate::wrapper;

/// 静态函数表中的一项
#[derive(Clone)]
pub struct StaticFunction {
    name: String,
    callback: NativeCallback,
    attributes: PropertyAttributes,
}

impl StaticFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn callback(&self) -> &NativeCallback {
        &self.callback
    }

    pub fn attributes(&self) -> PropertyAttributes {
        self.attributes
    }
}

impl fmt::Debug for StaticFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticFunction")
            .field("name", &self.name)
            .field("attributes", &self.attributes)
            .finish()
    }
}

/// 不可变的类定义记录
#[derive(Clone)]
pub struct ClassDefinition {
    name: String,
    get_property: Option<GetPropertyHook>,
    set_property: Option<SetPropertyHook>,
    property_names: Option<PropertyNamesHook>,
    static_functions: Vec<StaticFunction>,
    finalize: Option<FinalizeCallback>,
}

impl ClassDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_property_hook(&self) -> Option<&GetPropertyHook> {
        self.get_property.as_ref()
    }

    pub fn set_property_hook(&self) -> Option<&SetPropertyHook> {
        self.set_property.as_ref()
    }

    pub fn property_names_hook(&self) -> Option<&PropertyNamesHook> {
        self.property_names.as_ref()
    }

    pub fn static_functions(&self) -> &[StaticFunction] {
        &self.static_functions
    }

    pub fn static_function(&self, name: &str) -> Option<&StaticFunction> {
        self.static_functions.iter().find(|f| f.name == name)
    }

    pub fn finalizer(&self) -> Option<FinalizeCallback> {
        self.finalize
    }
}

impl fmt::Debug for ClassDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDefinition")
            .field("name", &self.name)
            .field("get_property", &self.get_property.is_some())
            .field("set_property", &self.set_property.is_some())
            .field("property_names", &self.property_names.is_some())
            .field("static_functions", &self.static_functions)
            .field("finalize", &self.finalize.is_some())
            .finish()
    }
}

/// 类定义构建器
///
/// 默认终结回调为 [`wrapper::release_native`]，即实例拥有它包装的原生对象。
pub struct ClassBuilder {
    definition: ClassDefinition,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            definition: ClassDefinition {
                name: name.into(),
                get_property: None,
                set_property: None,
                property_names: None,
                static_functions: Vec::new(),
                finalize: Some(wrapper::release_native),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// 属性读取钩子；返回 `Ok(None)` 表示交给引擎常规查找
    pub fn getter<F>(mut self, getter: F) -> Self
    where
        F: Fn(&mut dyn EngineApi, ObjectRef, &str) -> BridgeResult<Option<Value>> + 'static,
    {
        let hook: GetPropertyHook = Rc::new(
            move |engine: &mut dyn EngineApi,
                  object: ObjectRef,
                  name: &str,
                  slot: &mut ExceptionSlot| {
                match getter(engine, object, name) {
                    Ok(value) => value,
                    Err(error) => {
                        exception::throw(engine, &error, slot);
                        None
                    }
                }
            },
        );
        self.definition.get_property = Some(hook);
        self
    }

    /// 属性写入钩子；返回 `Ok(true)` 表示已处理
    pub fn setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(&mut dyn EngineApi, ObjectRef, &str, Value) -> BridgeResult<bool> + 'static,
    {
        let hook: SetPropertyHook = Rc::new(
            move |engine: &mut dyn EngineApi,
                  object: ObjectRef,
                  name: &str,
                  value: Value,
                  slot: &mut ExceptionSlot| {
                match setter(engine, object, name, value) {
                    Ok(handled) => handled,
                    Err(error) => {
                        exception::throw(engine, &error, slot);
                        true
                    }
                }
            },
        );
        self.definition.set_property = Some(hook);
        self
    }

    pub fn property_names<F>(mut self, enumerate: F) -> Self
    where
        F: Fn(&mut dyn EngineApi, ObjectRef) -> Vec<String> + 'static,
    {
        self.definition.property_names = Some(Rc::new(enumerate));
        self
    }

    pub fn static_function<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&mut dyn EngineApi, ObjectRef, &[Value]) -> BridgeResult<Value> + 'static,
    {
        self.definition.static_functions.push(StaticFunction {
            name: name.into(),
            callback: native_function(function),
            attributes: PropertyAttributes::HIDDEN,
        });
        self
    }

    pub fn finalizer(mut self, finalize: FinalizeCallback) -> Self {
        self.definition.finalize = Some(finalize);
        self
    }

    /// 不拥有原生对象的包装类：回收时不调用终结回调
    pub fn without_finalizer(mut self) -> Self {
        self.definition.finalize = None;
        self
    }

    pub fn definition(self) -> ClassDefinition {
        self.definition
    }

    /// 在引擎中创建类，返回可复用的类句柄
    pub fn build(self, engine: &mut dyn EngineApi) -> ClassRef {
        let name = self.definition.name.clone();
        let class = engine.class_create(self.definition);
        tracing::debug!(
            target: "script_bridge::class",
            class = class.raw(),
            %name,
            "Created class"
        );
        class
    }
}

/// 把返回 `BridgeResult` 的原生函数适配为引擎回调
///
/// 错误经由异常桥接写入引擎的异常槽，脚本侧看到的是被抛出的错误对象。
pub fn native_function<F>(function: F) -> NativeCallback
where
    F: Fn(&mut dyn EngineApi, ObjectRef, &[Value]) -> BridgeResult<Value> + 'static,
{
    Rc::new(
        move |engine: &mut dyn EngineApi,
              this: ObjectRef,
              arguments: &[Value],
              slot: &mut ExceptionSlot| {
            match function(engine, this, arguments) {
                Ok(value) => value,
                Err(error) => {
                    exception::throw(engine, &error, slot);
                    engine.undefined()
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessors;
    use crate::arguments::validate_argument_count;
    use crate::coerce;
    use crate::engine::MemoryEngine;
    use crate::exception::ErrorKind;
    use crate::string_bridge::value_for_string;
    use crate::wrapper::{unwrap, wrap, PrivateSlot};

    struct Point {
        x: f64,
    }

    fn point_class(engine: &mut MemoryEngine) -> ClassRef {
        ClassBuilder::new("Point")
            .getter(|engine, object, name| {
                if name != "x" {
                    return Ok(None);
                }
                let x = wrapper::validated_unwrap::<Point>(engine, object)?.x;
                Ok(Some(engine.make_number(x)))
            })
            .setter(|engine, object, name, value| {
                if name != "x" {
                    return Ok(false);
                }
                let x = coerce::to_number(engine, value)?;
                if let Some(point) = wrapper::unwrap_mut::<Point>(engine, object) {
                    point.x = x;
                }
                Ok(true)
            })
            .property_names(|_, _| vec!["x".to_string()])
            .static_function("scale", |engine, this, arguments| {
                validate_argument_count(arguments.len(), 1)?;
                let factor = coerce::to_number(engine, arguments[0])?;
                let x = wrapper::validated_unwrap::<Point>(engine, this)?.x;
                Ok(engine.make_number(x * factor))
            })
            .build(engine)
    }

    #[test]
    fn test_builder_defaults() {
        let definition = ClassBuilder::new("Realm").definition();
        assert_eq!(definition.name(), "Realm");
        assert!(definition.get_property_hook().is_none());
        assert!(definition.static_functions().is_empty());
        assert!(definition.finalizer().is_some());

        let definition = ClassBuilder::new("View").without_finalizer().definition();
        assert!(definition.finalizer().is_none());
    }

    #[test]
    fn test_custom_finalizer() {
        fn forget(slot: &mut PrivateSlot) {
            slot.finalize();
        }
        let definition = ClassBuilder::new("Custom").finalizer(forget).definition();
        assert!(definition.finalizer().is_some());
    }

    #[test]
    fn test_getter_and_setter_hooks() {
        let mut engine = MemoryEngine::new();
        let class = point_class(&mut engine);
        let point = wrap(&mut engine, class, Point { x: 2.0 }, None).unwrap();

        assert_eq!(accessors::number_property(&mut engine, point, "x").unwrap(), 2.0);

        let five = engine.make_number(5.0);
        accessors::set_property(&mut engine, point, "x", five, PropertyAttributes::NONE).unwrap();
        assert_eq!(unwrap::<Point>(&engine, point).map(|p| p.x), Some(5.0));

        // 未被钩子处理的属性走常规存储
        let label = value_for_string(&mut engine, "origin");
        accessors::set_property(&mut engine, point, "label", label, PropertyAttributes::NONE)
            .unwrap();
        assert_eq!(
            accessors::string_property(&mut engine, point, "label").unwrap(),
            "origin"
        );
    }

    #[test]
    fn test_setter_error_reaches_caller() {
        let mut engine = MemoryEngine::new();
        let class = point_class(&mut engine);
        let point = wrap(&mut engine, class, Point { x: 1.0 }, None).unwrap();
        let text = value_for_string(&mut engine, "far");

        let err = accessors::set_property(&mut engine, point, "x", text, PropertyAttributes::NONE)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Engine);
        assert_eq!(err.to_string(), "Error: Value is not a number");
    }

    #[test]
    fn test_property_enumeration() {
        let mut engine = MemoryEngine::new();
        let class = point_class(&mut engine);
        let point = wrap(&mut engine, class, Point { x: 1.0 }, None).unwrap();
        assert_eq!(engine.property_names(point), vec!["x".to_string()]);
    }

    #[test]
    fn test_static_function() {
        let mut engine = MemoryEngine::new();
        let class = point_class(&mut engine);
        let point = wrap(&mut engine, class, Point { x: 3.0 }, None).unwrap();

        let two = engine.make_number(2.0);
        let result = accessors::call_method(&mut engine, point, "scale", &[two]).unwrap();
        assert_eq!(coerce::to_number(&mut engine, result).unwrap(), 6.0);

        let err = accessors::call_method(&mut engine, point, "scale", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapturedScript);
        assert_eq!(err.to_string(), "Error: Invalid arguments: expected 1, got 0");
    }

    #[test]
    fn test_static_function_identity_is_stable() {
        let mut engine = MemoryEngine::new();
        let class = point_class(&mut engine);
        let point = wrap(&mut engine, class, Point { x: 3.0 }, None).unwrap();
        let first = accessors::property(&mut engine, point, "scale").unwrap();
        let second = accessors::property(&mut engine, point, "scale").unwrap();
        assert!(engine.strict_equals(first, second));
    }

    #[test]
    fn test_class_reused_for_many_instances() {
        let mut engine = MemoryEngine::new();
        let class = point_class(&mut engine);
        let points: Vec<ObjectRef> = (0..16)
            .map(|i| wrap(&mut engine, class, Point { x: i as f64 }, None).unwrap())
            .collect();
        for (i, point) in points.iter().enumerate() {
            assert_eq!(unwrap::<Point>(&engine, *point).map(|p| p.x), Some(i as f64));
        }
    }
}
