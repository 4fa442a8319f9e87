//! 全局类注册
//!
//! 类在宿主显式构造的 [`ClassRegistry`] 中登记，而不是进程级的单例表；
//! 注册表的生命周期由宿主控制。

use std::collections::HashMap;

use crate::class::ClassBuilder;
use crate::engine::{ClassRef, EngineApi, ExceptionSlot, ObjectRef, PropertyAttributes};
use crate::exception::{BridgeResult, NativeException};
use crate::string_bridge::with_engine_string;

/// 在全局对象上安装一个命名的类对象
///
/// 安装的属性只读、不可枚举、不可删除。引擎报告的异常以 [`NativeException::Engine`] 返回。
pub fn register_global_class(
    engine: &mut dyn EngineApi,
    global: ObjectRef,
    class: ClassRef,
    name: &str,
) -> BridgeResult<ObjectRef> {
    let mut exception = ExceptionSlot::new();
    let created = engine.make_object(Some(class), None, &mut exception);
    let object = exception
        .check(engine, "make_object", created)?
        .ok_or_else(|| NativeException::Message(format!("Failed to create global '{}'", name)))?;

    with_engine_string(engine, name, |engine, key| {
        engine.set_property(
            global,
            key,
            object.into(),
            PropertyAttributes::SEALED,
            &mut exception,
        )
    });
    exception.check(engine, "set_property", ())?;

    tracing::debug!(
        target: "script_bridge::registry",
        %name,
        class = class.raw(),
        "Registered global class"
    );
    Ok(object)
}

/// 宿主拥有的类注册表：名称到类句柄
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: HashMap<String, ClassRef>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 构建并登记一个类；同名类只能登记一次
    pub fn register(
        &mut self,
        engine: &mut dyn EngineApi,
        builder: ClassBuilder,
    ) -> BridgeResult<ClassRef> {
        let name = builder.name().to_string();
        if self.classes.contains_key(&name) {
            return Err(NativeException::Message(format!(
                "Class '{}' is already registered",
                name
            )));
        }
        let class = builder.build(engine);
        self.classes.insert(name, class);
        Ok(class)
    }

    pub fn get(&self, name: &str) -> Option<ClassRef> {
        self.classes.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// 把所有登记的类安装到全局对象上，按名称排序以保证顺序确定
    pub fn install_globals(&self, engine: &mut dyn EngineApi) -> BridgeResult<()> {
        let global = engine.global_object();
        let mut names: Vec<&String> = self.classes.keys().collect();
        names.sort();
        for name in names {
            register_global_class(engine, global, self.classes[name], name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessors;
    use crate::engine::MemoryEngine;
    use crate::exception::ErrorKind;

    #[test]
    fn test_register_global_class() {
        let mut engine = MemoryEngine::new();
        let class = ClassBuilder::new("Realm").build(&mut engine);
        let global = engine.global_object();

        let installed = register_global_class(&mut engine, global, class, "Realm").unwrap();
        let found = accessors::object_property(&mut engine, global, "Realm", None).unwrap();
        assert_eq!(found, installed);
        assert!(engine.private_slot(found).is_some());
        // 不可枚举
        assert!(!engine.property_names(global).contains(&"Realm".to_string()));
    }

    #[test]
    fn test_second_registration_is_rejected_by_engine() {
        let mut engine = MemoryEngine::new();
        let class = ClassBuilder::new("Realm").build(&mut engine);
        let global = engine.global_object();
        register_global_class(&mut engine, global, class, "Realm").unwrap();

        let err = register_global_class(&mut engine, global, class, "Realm").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Engine);
    }

    #[test]
    fn test_registered_global_survives_collection() {
        let mut engine = MemoryEngine::new();
        let class = ClassBuilder::new("Results").build(&mut engine);
        let global = engine.global_object();
        let installed = register_global_class(&mut engine, global, class, "Results").unwrap();
        engine.garbage_collect();
        assert!(engine.private_slot(installed).is_some());
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut engine = MemoryEngine::new();
        let mut registry = ClassRegistry::new();
        assert!(registry.is_empty());

        let realm = registry
            .register(&mut engine, ClassBuilder::new("Realm"))
            .unwrap();
        assert_eq!(registry.get("Realm"), Some(realm));
        assert_eq!(registry.len(), 1);

        let err = registry
            .register(&mut engine, ClassBuilder::new("Realm"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Native);
        assert!(registry.get("List").is_none());
    }

    #[test]
    fn test_install_globals() {
        let mut engine = MemoryEngine::new();
        let mut registry = ClassRegistry::new();
        registry.register(&mut engine, ClassBuilder::new("Realm")).unwrap();
        registry.register(&mut engine, ClassBuilder::new("List")).unwrap();
        registry.install_globals(&mut engine).unwrap();

        let global = engine.global_object();
        assert!(accessors::has_property(&mut engine, global, "Realm"));
        assert!(accessors::has_property(&mut engine, global, "List"));
    }
}
