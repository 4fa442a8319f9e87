//! 脚本引擎边界
//!
//! 本模块以 Rust 的方式表达嵌入式脚本引擎的 C 级接口：
//!
//! - **句柄类型**: [`Value`]、[`ObjectRef`]、[`ClassRef`]、[`StringHandle`]，生命周期由引擎管理
//! - **异常输出参数**: [`ExceptionSlot`]，引擎调用失败时写入被抛出的脚本值
//! - **回调类型**: 终结器、属性钩子、静态函数，由引擎在适当时机调用
//!
//! 桥接层的其余部分只通过 [`EngineApi`] 与引擎交互。

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::class::ClassDefinition;
use crate::wrapper::PrivateSlot;

pub mod memory;

pub use memory::MemoryEngine;

/// 脚本值句柄
///
/// 不透明的引擎堆引用。桥接层从不释放它，只在一次操作期间持有，
/// 或者保存在 [`crate::NativeException`] 中。引擎可以把槽位下标和代数
/// 一起编码进原始值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u64);

impl Value {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// 已知为对象的脚本值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(Value);

impl ObjectRef {
    /// 由引擎实现调用；调用方保证该值确实是对象
    pub const fn from_value_unchecked(value: Value) -> Self {
        Self(value)
    }

    pub const fn as_value(self) -> Value {
        self.0
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Self {
        object.0
    }
}

/// 类描述符句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassRef(u32);

impl ClassRef {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// 引擎字符串句柄
///
/// 引用计数由引擎维护：每个通过 `string_create` 或 `to_string_copy`
/// 得到的句柄都必须配对一次 `string_release`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringHandle(u32);

impl StringHandle {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// 脚本值的运行时类型
///
/// 数组和错误对象都归入 `Object`；数组判定通过全局 `Array` 构造函数完成。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Object,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Undefined => "undefined",
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Object => "object",
        };
        f.write_str(name)
    }
}

/// 异常输出参数
///
/// 引擎调用失败时把抛出的值写入这里。槽位一旦被设置，
/// 同一次调用的返回值就不可再使用。
#[derive(Debug, Default)]
pub struct ExceptionSlot {
    value: Option<Value>,
}

impl ExceptionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, value: Value) {
        self.value = Some(value);
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    pub fn peek(&self) -> Option<Value> {
        self.value
    }

    pub fn take(&mut self) -> Option<Value> {
        self.value.take()
    }
}

/// 属性特性
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropertyAttributes {
    pub read_only: bool,
    pub dont_enum: bool,
    pub dont_delete: bool,
}

impl PropertyAttributes {
    pub const NONE: Self = Self {
        read_only: false,
        dont_enum: false,
        dont_delete: false,
    };

    /// 全局类安装时使用：只读、不可枚举、不可删除
    pub const SEALED: Self = Self {
        read_only: true,
        dont_enum: true,
        dont_delete: true,
    };

    pub const HIDDEN: Self = Self {
        read_only: false,
        dont_enum: true,
        dont_delete: false,
    };
}

/// 私有槽中保存的原生对象
pub type NativeBox = Box<dyn Any>;

/// 终结回调：对象不可达时由引擎调用，每个实例恰好一次
pub type FinalizeCallback = fn(&mut PrivateSlot);

/// 属性读取钩子；返回 `None` 表示未处理，引擎继续常规查找
pub type GetPropertyHook =
    Rc<dyn Fn(&mut dyn EngineApi, ObjectRef, &str, &mut ExceptionSlot) -> Option<Value>>;

/// 属性写入钩子；返回 `true` 表示已处理
pub type SetPropertyHook =
    Rc<dyn Fn(&mut dyn EngineApi, ObjectRef, &str, Value, &mut ExceptionSlot) -> bool>;

/// 属性枚举钩子
pub type PropertyNamesHook = Rc<dyn Fn(&mut dyn EngineApi, ObjectRef) -> Vec<String>>;

/// 原生函数入口：`(engine, this, arguments, exception) -> result`
pub type NativeCallback =
    Rc<dyn Fn(&mut dyn EngineApi, ObjectRef, &[Value], &mut ExceptionSlot) -> Value>;

/// 嵌入式脚本引擎接口
///
/// 所有可能失败的操作都接受 `&mut ExceptionSlot`。失败时引擎写入槽位，
/// 并返回占位结果（`undefined`、`0.0`、`false` 或 `None`），调用方必须忽略它。
/// 一个引擎实例对应一个执行上下文，只能在拥有它的线程上使用。
pub trait EngineApi {
    // ==================== 字符串 ====================

    /// 创建引用计数为 1 的引擎字符串
    fn string_create(&mut self, text: &str) -> StringHandle;

    fn string_retain(&mut self, string: StringHandle);

    fn string_release(&mut self, string: StringHandle);

    fn string_to_utf8(&self, string: StringHandle) -> String;

    /// 当前未释放的字符串句柄数量
    fn live_strings(&self) -> usize;

    // ==================== 值 ====================

    fn undefined(&self) -> Value;

    fn null(&self) -> Value;

    fn make_boolean(&mut self, value: bool) -> Value;

    fn make_number(&mut self, value: f64) -> Value;

    /// 从字符串句柄创建脚本字符串值；不消耗句柄
    fn make_string(&mut self, string: StringHandle) -> Value;

    fn value_kind(&self, value: Value) -> ValueKind;

    fn to_boolean(&self, value: Value) -> bool;

    fn to_number(&mut self, value: Value, exception: &mut ExceptionSlot) -> f64;

    /// 转换为字符串；返回的句柄归调用方所有
    fn to_string_copy(
        &mut self,
        value: Value,
        exception: &mut ExceptionSlot,
    ) -> Option<StringHandle>;

    /// 非对象值返回 `None`；只有转换本身抛出异常时才写入槽位
    fn to_object(&mut self, value: Value, exception: &mut ExceptionSlot) -> Option<ObjectRef>;

    fn strict_equals(&self, a: Value, b: Value) -> bool;

    // ==================== 对象 ====================

    /// 创建对象；带类时对象拥有私有槽，`native` 直接存入槽中
    fn make_object(
        &mut self,
        class: Option<ClassRef>,
        native: Option<NativeBox>,
        exception: &mut ExceptionSlot,
    ) -> Option<ObjectRef>;

    fn make_array(&mut self, elements: &[Value], exception: &mut ExceptionSlot)
        -> Option<ObjectRef>;

    fn make_error(
        &mut self,
        message: StringHandle,
        exception: &mut ExceptionSlot,
    ) -> Option<ObjectRef>;

    fn make_function(
        &mut self,
        name: StringHandle,
        callback: NativeCallback,
        exception: &mut ExceptionSlot,
    ) -> Option<ObjectRef>;

    /// 没有私有槽（普通对象）或对象已被回收时返回 `None`
    fn private_slot(&self, object: ObjectRef) -> Option<&PrivateSlot>;

    fn private_slot_mut(&mut self, object: ObjectRef) -> Option<&mut PrivateSlot>;

    fn prototype(&self, object: ObjectRef) -> Value;

    fn set_prototype(&mut self, object: ObjectRef, prototype: Value);

    fn get_property(
        &mut self,
        object: ObjectRef,
        name: StringHandle,
        exception: &mut ExceptionSlot,
    ) -> Value;

    fn set_property(
        &mut self,
        object: ObjectRef,
        name: StringHandle,
        value: Value,
        attributes: PropertyAttributes,
        exception: &mut ExceptionSlot,
    );

    fn get_property_at_index(
        &mut self,
        object: ObjectRef,
        index: u32,
        exception: &mut ExceptionSlot,
    ) -> Value;

    fn set_property_at_index(
        &mut self,
        object: ObjectRef,
        index: u32,
        value: Value,
        exception: &mut ExceptionSlot,
    );

    /// 沿原型链检查属性是否存在；不调用读取钩子
    fn has_property(&mut self, object: ObjectRef, name: StringHandle) -> bool;

    /// 可枚举的自有属性名，加上类枚举钩子提供的名字
    fn property_names(&mut self, object: ObjectRef) -> Vec<String>;

    fn is_instance_of(
        &mut self,
        value: Value,
        constructor: ObjectRef,
        exception: &mut ExceptionSlot,
    ) -> bool;

    /// `this` 为 `None` 时使用全局对象
    fn call_function(
        &mut self,
        function: ObjectRef,
        this: Option<ObjectRef>,
        arguments: &[Value],
        exception: &mut ExceptionSlot,
    ) -> Value;

    fn global_object(&self) -> ObjectRef;

    // ==================== 类 ====================

    fn class_create(&mut self, definition: ClassDefinition) -> ClassRef;

    fn class_definition(&self, class: ClassRef) -> Option<&ClassDefinition>;

    // ==================== 生命周期 ====================

    /// 将值加入根集合；可重复调用，需要同样次数的 `unprotect`
    fn protect(&mut self, value: Value);

    fn unprotect(&mut self, value: Value);

    fn garbage_collect(&mut self);
}
