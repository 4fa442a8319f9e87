// ============================================================================
// 内存参考引擎
// 确定性的单线程句柄堆，实现完整的 EngineApi 边界
// ============================================================================

//! 内存中的参考引擎
//!
//! 不是脚本解释器：没有解析器和字节码，只提供桥接层需要的对象模型。
//!
//! - 值句柄由槽位下标和槽位代数组成。回收会释放槽位并递增代数，
//!   槽位可以复用，但同一个句柄不会再次发出，旧句柄读作“不存在的对象”
//! - 数组由连续前缀和稀疏尾部组成，远离前缀的下标和 `length` 不会分配存储
//! - 全局对象带有 `Object`、`Array`、`Error` 三个构造函数及其原型
//! - 属性查找顺序：读取钩子、静态函数表、自有属性、原型链
//! - 回收只在显式调用 [`EngineApi::garbage_collect`] 时发生

use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use super::{
    ClassRef, EngineApi, ExceptionSlot, NativeBox, NativeCallback, ObjectRef, PropertyAttributes,
    StringHandle, Value, ValueKind,
};
use crate::class::ClassDefinition;
use crate::config::HeapConfig;
use crate::wrapper::PrivateSlot;

const UNDEFINED: Value = Value::from_raw(0);
const NULL: Value = Value::from_raw(1);
const TRUE: Value = Value::from_raw(2);
const FALSE: Value = Value::from_raw(3);
const PERMANENT_CELLS: usize = 4;

/// 超过连续前缀末尾这么多的下标写入稀疏表
const DENSE_GAP: usize = 1024;
/// 数组转字符串时允许的最大长度，超出时抛出 RangeError
const MAX_JOINED_LENGTH: usize = 1 << 24;

/// 引擎启动时创建的对象数量：三个原型、三个构造函数和全局对象
pub const BOOTSTRAP_OBJECTS: usize = 7;

enum Cell {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Object(Box<ObjectData>),
}

enum ObjectKind {
    Plain,
    Array(Elements),
    Error,
    Function {
        name: Rc<str>,
        callback: NativeCallback,
    },
    Instance {
        class: ClassRef,
        slot: PrivateSlot,
    },
}

#[derive(Clone, Copy)]
struct Property {
    value: Value,
    attributes: PropertyAttributes,
}

struct ObjectData {
    kind: ObjectKind,
    prototype: Value,
    properties: Vec<(String, Property)>,
    /// 已物化的静态函数，保证同一实例上的函数同一性
    statics: HashMap<String, Value>,
}

impl ObjectData {
    fn new(kind: ObjectKind, prototype: Value) -> Self {
        Self {
            kind,
            prototype,
            properties: Vec::new(),
            statics: HashMap::new(),
        }
    }

    fn own(&self, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, property)| property)
    }

    fn define(&mut self, name: &str, value: Value, attributes: PropertyAttributes) {
        match self.properties.iter_mut().find(|(key, _)| key == name) {
            Some((_, property)) => *property = Property { value, attributes },
            None => self
                .properties
                .push((name.to_string(), Property { value, attributes })),
        }
    }
}

/// 数组元素：连续前缀加稀疏尾部
///
/// 不变式：`dense.len() <= length`，稀疏表的键都不小于 `dense.len()` 且小于 `length`。
struct Elements {
    dense: Vec<Value>,
    sparse: BTreeMap<usize, Value>,
    length: usize,
}

impl Elements {
    fn from_slice(values: &[Value]) -> Self {
        Self {
            dense: values.to_vec(),
            sparse: BTreeMap::new(),
            length: values.len(),
        }
    }

    fn len(&self) -> usize {
        self.length
    }

    fn get(&self, index: usize) -> Option<Value> {
        self.dense
            .get(index)
            .copied()
            .or_else(|| self.sparse.get(&index).copied())
    }

    fn contains(&self, index: usize) -> bool {
        index < self.dense.len() || self.sparse.contains_key(&index)
    }

    fn set(&mut self, index: usize, value: Value) {
        if index < self.dense.len() {
            self.dense[index] = value;
        } else if index <= self.dense.len() + DENSE_GAP {
            self.dense.resize(index + 1, UNDEFINED);
            // 落入新前缀范围的稀疏元素并回前缀
            let tail = self.sparse.split_off(&self.dense.len());
            for (position, element) in std::mem::replace(&mut self.sparse, tail) {
                self.dense[position] = element;
            }
            self.dense[index] = value;
        } else {
            self.sparse.insert(index, value);
        }
        self.length = self.length.max(index + 1);
    }

    fn set_length(&mut self, length: usize) {
        self.dense.truncate(length);
        self.sparse.retain(|&index, _| index < length);
        self.length = length;
    }

    fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.dense
            .iter()
            .copied()
            .chain(self.sparse.values().copied())
    }

    fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.dense.len()).chain(self.sparse.keys().copied())
    }
}

/// 单元表的一个槽位
struct HeapEntry {
    generation: u32,
    cell: Option<Cell>,
}

fn handle(index: usize, generation: u32) -> Value {
    Value::from_raw((u64::from(generation) << 32) | index as u64)
}

fn split_handle(value: Value) -> (usize, u32) {
    let raw = value.raw();
    ((raw & u64::from(u32::MAX)) as usize, (raw >> 32) as u32)
}

struct StringEntry {
    text: Rc<str>,
    refs: usize,
}

/// 自有属性查找的结果
enum OwnLookup {
    Found(Value),
    Number(f64),
    Text(Rc<str>),
    Missing,
}

/// 内存参考引擎
pub struct MemoryEngine {
    config: HeapConfig,
    cells: Vec<HeapEntry>,
    free: Vec<usize>,
    strings: HashMap<u32, StringEntry>,
    next_string: u32,
    classes: Vec<ClassDefinition>,
    protected: HashMap<Value, usize>,
    live_objects: usize,
    call_depth: usize,
    global: ObjectRef,
    object_prototype: Value,
    array_prototype: Value,
    error_prototype: Value,
    intrinsics: Vec<Value>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::with_config(HeapConfig::default())
    }

    pub fn with_config(config: HeapConfig) -> Self {
        let mut cells = Vec::with_capacity(config.initial_capacity.max(PERMANENT_CELLS));
        for cell in [
            Cell::Undefined,
            Cell::Null,
            Cell::Boolean(true),
            Cell::Boolean(false),
        ] {
            cells.push(HeapEntry {
                generation: 0,
                cell: Some(cell),
            });
        }

        let mut engine = Self {
            config,
            cells,
            free: Vec::new(),
            strings: HashMap::new(),
            next_string: 1,
            classes: Vec::new(),
            protected: HashMap::new(),
            live_objects: 0,
            call_depth: 0,
            global: ObjectRef::from_value_unchecked(UNDEFINED),
            object_prototype: NULL,
            array_prototype: NULL,
            error_prototype: NULL,
            intrinsics: Vec::new(),
        };
        engine.bootstrap();
        engine
    }

    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// 当前存活的对象数量
    pub fn live_objects(&self) -> usize {
        self.live_objects
    }

    /// 单元表的槽位总数，包括等待复用的空闲槽位
    pub fn heap_slots(&self) -> usize {
        self.cells.len()
    }

    fn bootstrap(&mut self) {
        let object_prototype = self.alloc_object_unchecked(ObjectData::new(ObjectKind::Plain, NULL));
        self.object_prototype = object_prototype.into();

        let array_prototype = self.alloc_object_unchecked(ObjectData::new(
            ObjectKind::Plain,
            self.object_prototype,
        ));
        self.array_prototype = array_prototype.into();

        let error_prototype = self.alloc_object_unchecked(ObjectData::new(
            ObjectKind::Plain,
            self.object_prototype,
        ));
        self.error_prototype = error_prototype.into();
        let error_name = self.alloc(Cell::String(Rc::from("Error")));
        let empty = self.alloc(Cell::String(Rc::from("")));
        if let Some(data) = self.object_mut(error_prototype) {
            data.define("name", error_name, PropertyAttributes::HIDDEN);
            data.define("message", empty, PropertyAttributes::HIDDEN);
        }

        let global = self.alloc_object_unchecked(ObjectData::new(
            ObjectKind::Plain,
            self.object_prototype,
        ));
        self.global = global;

        let object_constructor: NativeCallback = Rc::new(
            |engine: &mut dyn EngineApi,
             _this: ObjectRef,
             _arguments: &[Value],
             exception: &mut ExceptionSlot| {
                engine
                    .make_object(None, None, exception)
                    .map(Value::from)
                    .unwrap_or_else(|| engine.undefined())
            },
        );
        let array_constructor: NativeCallback = Rc::new(
            |engine: &mut dyn EngineApi,
             _this: ObjectRef,
             arguments: &[Value],
             exception: &mut ExceptionSlot| {
                engine
                    .make_array(arguments, exception)
                    .map(Value::from)
                    .unwrap_or_else(|| engine.undefined())
            },
        );
        let error_constructor: NativeCallback = Rc::new(
            |engine: &mut dyn EngineApi,
             _this: ObjectRef,
             arguments: &[Value],
             exception: &mut ExceptionSlot| {
                let message = match arguments.first() {
                    Some(&value) if engine.value_kind(value) != ValueKind::Undefined => {
                        engine.to_string_copy(value, exception)
                    }
                    _ => Some(engine.string_create("")),
                };
                let Some(message) = message else {
                    return engine.undefined();
                };
                let created = engine.make_error(message, exception);
                engine.string_release(message);
                created
                    .map(Value::from)
                    .unwrap_or_else(|| engine.undefined())
            },
        );

        for (name, callback, prototype) in [
            ("Object", object_constructor, object_prototype),
            ("Array", array_constructor, array_prototype),
            ("Error", error_constructor, error_prototype),
        ] {
            let constructor = self.alloc_function(name, callback);
            if let Some(data) = self.object_mut(constructor) {
                data.define("prototype", prototype.into(), PropertyAttributes::SEALED);
            }
            if let Some(data) = self.object_mut(prototype) {
                data.define("constructor", constructor.into(), PropertyAttributes::HIDDEN);
            }
            if let Some(data) = self.object_mut(global) {
                data.define(name, constructor.into(), PropertyAttributes::HIDDEN);
            }
            self.intrinsics.push(constructor.into());
        }
        self.intrinsics.extend([
            self.object_prototype,
            self.array_prototype,
            self.error_prototype,
            global.into(),
        ]);

        tracing::debug!(
            target: "script_bridge::engine",
            objects = self.live_objects,
            "Bootstrapped memory engine"
        );
    }

    // ==================== 单元分配 ====================

    fn alloc(&mut self, cell: Cell) -> Value {
        if let Some(index) = self.free.pop() {
            let entry = &mut self.cells[index];
            entry.cell = Some(cell);
            return handle(index, entry.generation);
        }
        let index = self.cells.len();
        self.cells.push(HeapEntry {
            generation: 0,
            cell: Some(cell),
        });
        handle(index, 0)
    }

    fn alloc_object_unchecked(&mut self, data: ObjectData) -> ObjectRef {
        self.live_objects += 1;
        ObjectRef::from_value_unchecked(self.alloc(Cell::Object(Box::new(data))))
    }

    fn alloc_object(&mut self, data: ObjectData, exception: &mut ExceptionSlot) -> Option<ObjectRef> {
        if self.live_objects >= self.config.max_objects {
            // 被拒绝的数据在这里释放，其中的原生对象随之销毁
            drop(data);
            self.throw_error(
                "RangeError",
                "Out of memory: live object limit reached",
                exception,
            );
            return None;
        }
        Some(self.alloc_object_unchecked(data))
    }

    fn alloc_function(&mut self, name: &str, callback: NativeCallback) -> ObjectRef {
        self.alloc_object_unchecked(ObjectData::new(
            ObjectKind::Function {
                name: Rc::from(name),
                callback,
            },
            self.object_prototype,
        ))
    }

    fn new_error(&mut self, name: &str, message: &str) -> ObjectData {
        let message = self.alloc(Cell::String(Rc::from(message)));
        let mut data = ObjectData::new(ObjectKind::Error, self.error_prototype);
        data.define("message", message, PropertyAttributes::HIDDEN);
        if name != "Error" {
            let name = self.alloc(Cell::String(Rc::from(name)));
            data.define("name", name, PropertyAttributes::HIDDEN);
        }
        data
    }

    fn throw_error(&mut self, name: &str, message: &str, exception: &mut ExceptionSlot) {
        let data = self.new_error(name, message);
        let error = self.alloc_object_unchecked(data);
        exception.set(error.into());
    }

    fn throw_type_error(&mut self, message: &str, exception: &mut ExceptionSlot) {
        self.throw_error("TypeError", message, exception);
    }

    /// 未知或已释放的句柄读作空字符串，并记录警告
    fn string_text(&self, string: StringHandle) -> Rc<str> {
        match self.strings.get(&string.raw()) {
            Some(entry) => Rc::clone(&entry.text),
            None => {
                tracing::warn!(
                    target: "script_bridge::engine",
                    string = string.raw(),
                    "Read of an unknown string handle"
                );
                Rc::from("")
            }
        }
    }

    // ==================== 单元访问 ====================

    fn cell(&self, value: Value) -> Option<&Cell> {
        let (index, generation) = split_handle(value);
        let entry = self.cells.get(index)?;
        if entry.generation != generation {
            return None;
        }
        entry.cell.as_ref()
    }

    fn object(&self, object: ObjectRef) -> Option<&ObjectData> {
        match self.cell(object.as_value())? {
            Cell::Object(data) => Some(data),
            _ => None,
        }
    }

    fn object_mut(&mut self, object: ObjectRef) -> Option<&mut ObjectData> {
        let (index, generation) = split_handle(object.as_value());
        let entry = self.cells.get_mut(index)?;
        if entry.generation != generation {
            return None;
        }
        match entry.cell.as_mut()? {
            Cell::Object(data) => Some(data),
            _ => None,
        }
    }

    fn as_object(&self, value: Value) -> Option<ObjectRef> {
        match self.cell(value)? {
            Cell::Object(_) => Some(ObjectRef::from_value_unchecked(value)),
            _ => None,
        }
    }

    fn class_of(&self, object: ObjectRef) -> Option<&ClassDefinition> {
        match &self.object(object)?.kind {
            ObjectKind::Instance { class, .. } => self.classes.get(class.raw() as usize),
            _ => None,
        }
    }

    fn require_live(&mut self, object: ObjectRef, exception: &mut ExceptionSlot) -> bool {
        if self.object(object).is_some() {
            return true;
        }
        self.throw_type_error("Object has been collected", exception);
        false
    }

    /// 只查自有属性与原型链上的普通属性，不调用钩子
    fn plain_get(&self, object: ObjectRef, name: &str) -> Option<Value> {
        let mut visited = HashSet::new();
        let mut current = Some(object);
        while let Some(target) = current {
            if !visited.insert(target.as_value()) {
                break;
            }
            let data = self.object(target)?;
            if let Some(property) = data.own(name) {
                return Some(property.value);
            }
            current = self.as_object(data.prototype);
        }
        None
    }

    // ==================== 属性查找 ====================

    fn lookup(&mut self, object: ObjectRef, name: &str, exception: &mut ExceptionSlot) -> Value {
        let mut visited = HashSet::new();
        let mut current = Some(object);
        while let Some(target) = current {
            if !visited.insert(target.as_value()) {
                break;
            }
            if let Some(value) = self.lookup_own(target, name, exception) {
                return value;
            }
            if exception.is_set() {
                return UNDEFINED;
            }
            current = self
                .object(target)
                .and_then(|data| self.as_object(data.prototype));
        }
        UNDEFINED
    }

    fn lookup_own(
        &mut self,
        object: ObjectRef,
        name: &str,
        exception: &mut ExceptionSlot,
    ) -> Option<Value> {
        let getter = self
            .class_of(object)
            .and_then(|class| class.get_property_hook().cloned());
        if let Some(getter) = getter {
            let handled = getter(self, object, name, exception);
            if exception.is_set() {
                return Some(UNDEFINED);
            }
            if handled.is_some() {
                return handled;
            }
        }

        if let Some(function) = self.static_member(object, name) {
            return Some(function);
        }

        let found = {
            let data = self.object(object)?;
            match (&data.kind, array_index(name)) {
                (ObjectKind::Array(elements), _) if name == "length" => {
                    OwnLookup::Number(elements.len() as f64)
                }
                (ObjectKind::Array(elements), Some(index)) if elements.contains(index) => {
                    OwnLookup::Found(elements.get(index).unwrap_or(UNDEFINED))
                }
                (ObjectKind::Function { name: function, .. }, _) if name == "name" => {
                    OwnLookup::Text(Rc::clone(function))
                }
                _ => match data.own(name) {
                    Some(property) => OwnLookup::Found(property.value),
                    None => OwnLookup::Missing,
                },
            }
        };
        match found {
            OwnLookup::Found(value) => Some(value),
            OwnLookup::Number(number) => Some(self.make_number(number)),
            OwnLookup::Text(text) => Some(self.alloc(Cell::String(text))),
            OwnLookup::Missing => None,
        }
    }

    fn static_member(&mut self, object: ObjectRef, name: &str) -> Option<Value> {
        let callback = self
            .class_of(object)?
            .static_function(name)?
            .callback()
            .clone();
        if let Some(&existing) = self.object(object)?.statics.get(name) {
            return Some(existing);
        }
        let function: Value = self.alloc_function(name, callback).into();
        self.object_mut(object)?
            .statics
            .insert(name.to_string(), function);
        Some(function)
    }

    fn put(
        &mut self,
        object: ObjectRef,
        name: &str,
        value: Value,
        attributes: PropertyAttributes,
        exception: &mut ExceptionSlot,
    ) {
        if !self.require_live(object, exception) {
            return;
        }

        let setter = self
            .class_of(object)
            .and_then(|class| class.set_property_hook().cloned());
        if let Some(setter) = setter {
            if setter(self, object, name, value, exception) || exception.is_set() {
                return;
            }
        }

        let is_array = matches!(
            self.object(object).map(|data| &data.kind),
            Some(ObjectKind::Array(_))
        );
        if is_array {
            if name == "length" {
                self.resize_array(object, value, exception);
                return;
            }
            if let Some(index) = array_index(name) {
                self.put_element(object, index, value);
                return;
            }
        }

        let read_only = self
            .object(object)
            .and_then(|data| data.own(name))
            .map(|property| property.attributes.read_only)
            .unwrap_or(false);
        if read_only {
            self.throw_type_error(
                &format!("Attempted to assign to readonly property '{}'", name),
                exception,
            );
            return;
        }
        if let Some(data) = self.object_mut(object) {
            data.define(name, value, attributes);
        }
    }

    fn put_element(&mut self, object: ObjectRef, index: usize, value: Value) {
        if let Some(ObjectKind::Array(elements)) = self.object_mut(object).map(|data| &mut data.kind)
        {
            elements.set(index, value);
        }
    }

    fn resize_array(&mut self, object: ObjectRef, value: Value, exception: &mut ExceptionSlot) {
        let length = match self.cell(value) {
            Some(Cell::Number(n)) if *n >= 0.0 && n.fract() == 0.0 && *n <= u32::MAX as f64 => {
                *n as usize
            }
            _ => {
                self.throw_error("RangeError", "Invalid array length", exception);
                return;
            }
        };
        if let Some(ObjectKind::Array(elements)) = self.object_mut(object).map(|data| &mut data.kind)
        {
            elements.set_length(length);
        }
    }

    // ==================== 转换 ====================

    /// 把值转换为字符串；结果超过 [`MAX_JOINED_LENGTH`] 个元素的数组返回 `None`
    fn render(&self, value: Value, visited: &mut HashSet<Value>) -> Option<String> {
        let text = match self.cell(value) {
            None | Some(Cell::Undefined) => "undefined".to_string(),
            Some(Cell::Null) => "null".to_string(),
            Some(Cell::Boolean(b)) => b.to_string(),
            Some(Cell::Number(n)) => format_number(*n),
            Some(Cell::String(text)) => text.to_string(),
            Some(Cell::Object(data)) => {
                let object = ObjectRef::from_value_unchecked(value);
                match &data.kind {
                    ObjectKind::Error => {
                        let name = match self.plain_get(object, "name") {
                            Some(name) => self.render(name, visited)?,
                            None => "Error".to_string(),
                        };
                        let message = match self.plain_get(object, "message") {
                            Some(message) => self.render(message, visited)?,
                            None => String::new(),
                        };
                        if message.is_empty() {
                            name
                        } else {
                            format!("{}: {}", name, message)
                        }
                    }
                    ObjectKind::Array(elements) => {
                        if elements.len() > MAX_JOINED_LENGTH {
                            return None;
                        }
                        if !visited.insert(value) {
                            return Some(String::new());
                        }
                        let joined = self.join_elements(elements, visited);
                        visited.remove(&value);
                        joined?
                    }
                    ObjectKind::Function { name, .. } => {
                        format!("function {}() {{\n    [native code]\n}}", name)
                    }
                    ObjectKind::Plain | ObjectKind::Instance { .. } => {
                        "[object Object]".to_string()
                    }
                }
            }
        };
        Some(text)
    }

    fn join_elements(&self, elements: &Elements, visited: &mut HashSet<Value>) -> Option<String> {
        let mut joined = String::new();
        for index in 0..elements.len() {
            if index > 0 {
                joined.push(',');
            }
            let Some(element) = elements.get(index) else {
                continue;
            };
            match self.cell(element) {
                None | Some(Cell::Undefined) | Some(Cell::Null) => {}
                _ => joined.push_str(&self.render(element, visited)?),
            }
            if joined.len() > MAX_JOINED_LENGTH {
                return None;
            }
        }
        Some(joined)
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryEngine {
    fn drop(&mut self) {
        let mut finalized = 0usize;
        for entry in self.cells.iter_mut() {
            if let Some(Cell::Object(data)) = entry.cell.take() {
                if finalize_object(&self.classes, *data) {
                    finalized += 1;
                }
            }
        }
        tracing::debug!(
            target: "script_bridge::engine",
            finalized,
            "Memory engine torn down"
        );
    }
}

/// 调用类的终结回调；返回是否调用了回调
fn finalize_object(classes: &[ClassDefinition], data: ObjectData) -> bool {
    match data.kind {
        ObjectKind::Instance { class, mut slot } => {
            match classes
                .get(class.raw() as usize)
                .and_then(|definition| definition.finalizer())
            {
                Some(finalize) => {
                    finalize(&mut slot);
                    true
                }
                None => false,
            }
        }
        _ => false,
    }
}

fn array_index(name: &str) -> Option<usize> {
    if name.is_empty() || (name.len() > 1 && name.starts_with('0')) {
        return None;
    }
    if !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // 2^32 - 1 不是数组下标
    name.parse::<u32>()
        .ok()
        .filter(|&index| index != u32::MAX)
        .map(|index| index as usize)
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}

fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    match trimmed {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-')) =>
        {
            trimmed.parse().unwrap_or(f64::NAN)
        }
        _ => f64::NAN,
    }
}

impl EngineApi for MemoryEngine {
    // ==================== 字符串 ====================

    fn string_create(&mut self, text: &str) -> StringHandle {
        let id = self.next_string;
        self.next_string += 1;
        self.strings.insert(
            id,
            StringEntry {
                text: Rc::from(text),
                refs: 1,
            },
        );
        StringHandle::from_raw(id)
    }

    fn string_retain(&mut self, string: StringHandle) {
        if let Some(entry) = self.strings.get_mut(&string.raw()) {
            entry.refs += 1;
        }
    }

    fn string_release(&mut self, string: StringHandle) {
        let released = match self.strings.get_mut(&string.raw()) {
            Some(entry) => {
                entry.refs -= 1;
                entry.refs == 0
            }
            None => {
                tracing::warn!(
                    target: "script_bridge::engine",
                    string = string.raw(),
                    "Release of an unknown string handle"
                );
                false
            }
        };
        if released {
            self.strings.remove(&string.raw());
        }
    }

    fn string_to_utf8(&self, string: StringHandle) -> String {
        self.string_text(string).to_string()
    }

    fn live_strings(&self) -> usize {
        self.strings.len()
    }

    // ==================== 值 ====================

    fn undefined(&self) -> Value {
        UNDEFINED
    }

    fn null(&self) -> Value {
        NULL
    }

    fn make_boolean(&mut self, value: bool) -> Value {
        if value {
            TRUE
        } else {
            FALSE
        }
    }

    fn make_number(&mut self, value: f64) -> Value {
        self.alloc(Cell::Number(value))
    }

    fn make_string(&mut self, string: StringHandle) -> Value {
        let text = self.string_text(string);
        self.alloc(Cell::String(text))
    }

    fn value_kind(&self, value: Value) -> ValueKind {
        match self.cell(value) {
            None | Some(Cell::Undefined) => ValueKind::Undefined,
            Some(Cell::Null) => ValueKind::Null,
            Some(Cell::Boolean(_)) => ValueKind::Boolean,
            Some(Cell::Number(_)) => ValueKind::Number,
            Some(Cell::String(_)) => ValueKind::String,
            Some(Cell::Object(_)) => ValueKind::Object,
        }
    }

    fn to_boolean(&self, value: Value) -> bool {
        match self.cell(value) {
            None | Some(Cell::Undefined) | Some(Cell::Null) => false,
            Some(Cell::Boolean(b)) => *b,
            Some(Cell::Number(n)) => *n != 0.0 && !n.is_nan(),
            Some(Cell::String(text)) => !text.is_empty(),
            Some(Cell::Object(_)) => true,
        }
    }

    fn to_number(&mut self, value: Value, exception: &mut ExceptionSlot) -> f64 {
        match self.cell(value) {
            None | Some(Cell::Undefined) => f64::NAN,
            Some(Cell::Null) => 0.0,
            Some(Cell::Boolean(b)) => f64::from(u8::from(*b)),
            Some(Cell::Number(n)) => *n,
            Some(Cell::String(text)) => parse_number(text),
            Some(Cell::Object(_)) => match self.render(value, &mut HashSet::new()) {
                Some(text) => parse_number(&text),
                None => {
                    self.throw_error("RangeError", "Invalid string length", exception);
                    f64::NAN
                }
            },
        }
    }

    fn to_string_copy(
        &mut self,
        value: Value,
        exception: &mut ExceptionSlot,
    ) -> Option<StringHandle> {
        match self.render(value, &mut HashSet::new()) {
            Some(text) => Some(self.string_create(&text)),
            None => {
                self.throw_error("RangeError", "Invalid string length", exception);
                None
            }
        }
    }

    fn to_object(&mut self, value: Value, _exception: &mut ExceptionSlot) -> Option<ObjectRef> {
        self.as_object(value)
    }

    fn strict_equals(&self, a: Value, b: Value) -> bool {
        match (self.cell(a), self.cell(b)) {
            (None | Some(Cell::Undefined), None | Some(Cell::Undefined)) => true,
            (Some(Cell::Null), Some(Cell::Null)) => true,
            (Some(Cell::Boolean(x)), Some(Cell::Boolean(y))) => x == y,
            (Some(Cell::Number(x)), Some(Cell::Number(y))) => x == y,
            (Some(Cell::String(x)), Some(Cell::String(y))) => x == y,
            (Some(Cell::Object(_)), Some(Cell::Object(_))) => a == b,
            _ => false,
        }
    }

    // ==================== 对象 ====================

    fn make_object(
        &mut self,
        class: Option<ClassRef>,
        native: Option<NativeBox>,
        exception: &mut ExceptionSlot,
    ) -> Option<ObjectRef> {
        let kind = match class {
            Some(class) => {
                if self.classes.get(class.raw() as usize).is_none() {
                    self.throw_type_error("Unknown class", exception);
                    return None;
                }
                ObjectKind::Instance {
                    class,
                    slot: native.map(PrivateSlot::with_native).unwrap_or_default(),
                }
            }
            // 没有类的对象没有私有槽
            None => ObjectKind::Plain,
        };
        self.alloc_object(ObjectData::new(kind, self.object_prototype), exception)
    }

    fn make_array(
        &mut self,
        elements: &[Value],
        exception: &mut ExceptionSlot,
    ) -> Option<ObjectRef> {
        self.alloc_object(
            ObjectData::new(
                ObjectKind::Array(Elements::from_slice(elements)),
                self.array_prototype,
            ),
            exception,
        )
    }

    fn make_error(
        &mut self,
        message: StringHandle,
        exception: &mut ExceptionSlot,
    ) -> Option<ObjectRef> {
        let message = self.string_to_utf8(message);
        let data = self.new_error("Error", &message);
        self.alloc_object(data, exception)
    }

    fn make_function(
        &mut self,
        name: StringHandle,
        callback: NativeCallback,
        exception: &mut ExceptionSlot,
    ) -> Option<ObjectRef> {
        let name = self.string_to_utf8(name);
        self.alloc_object(
            ObjectData::new(
                ObjectKind::Function {
                    name: Rc::from(name.as_str()),
                    callback,
                },
                self.object_prototype,
            ),
            exception,
        )
    }

    fn private_slot(&self, object: ObjectRef) -> Option<&PrivateSlot> {
        match &self.object(object)?.kind {
            ObjectKind::Instance { slot, .. } => Some(slot),
            _ => None,
        }
    }

    fn private_slot_mut(&mut self, object: ObjectRef) -> Option<&mut PrivateSlot> {
        match &mut self.object_mut(object)?.kind {
            ObjectKind::Instance { slot, .. } => Some(slot),
            _ => None,
        }
    }

    fn prototype(&self, object: ObjectRef) -> Value {
        self.object(object).map(|data| data.prototype).unwrap_or(NULL)
    }

    fn set_prototype(&mut self, object: ObjectRef, prototype: Value) {
        let accepted = matches!(self.cell(prototype), Some(Cell::Object(_)) | Some(Cell::Null));
        if !accepted {
            return;
        }
        if let Some(data) = self.object_mut(object) {
            data.prototype = prototype;
        }
    }

    fn get_property(
        &mut self,
        object: ObjectRef,
        name: StringHandle,
        exception: &mut ExceptionSlot,
    ) -> Value {
        if !self.require_live(object, exception) {
            return UNDEFINED;
        }
        let name = self.string_to_utf8(name);
        self.lookup(object, &name, exception)
    }

    fn set_property(
        &mut self,
        object: ObjectRef,
        name: StringHandle,
        value: Value,
        attributes: PropertyAttributes,
        exception: &mut ExceptionSlot,
    ) {
        let name = self.string_to_utf8(name);
        self.put(object, &name, value, attributes, exception);
    }

    fn get_property_at_index(
        &mut self,
        object: ObjectRef,
        index: u32,
        exception: &mut ExceptionSlot,
    ) -> Value {
        if !self.require_live(object, exception) {
            return UNDEFINED;
        }
        if let Some(ObjectKind::Array(elements)) = self.object(object).map(|data| &data.kind) {
            if let Some(value) = elements.get(index as usize) {
                return value;
            }
        }
        self.lookup(object, &index.to_string(), exception)
    }

    fn set_property_at_index(
        &mut self,
        object: ObjectRef,
        index: u32,
        value: Value,
        exception: &mut ExceptionSlot,
    ) {
        self.put(
            object,
            &index.to_string(),
            value,
            PropertyAttributes::NONE,
            exception,
        );
    }

    fn has_property(&mut self, object: ObjectRef, name: StringHandle) -> bool {
        let name = self.string_to_utf8(name);
        let mut visited = HashSet::new();
        let mut current = Some(object);
        while let Some(target) = current {
            if !visited.insert(target.as_value()) {
                break;
            }
            let Some(data) = self.object(target) else {
                break;
            };
            let in_array = match (&data.kind, array_index(&name)) {
                (ObjectKind::Array(_), _) if name == "length" => true,
                (ObjectKind::Array(elements), Some(index)) => elements.contains(index),
                _ => false,
            };
            let is_static = self
                .class_of(target)
                .map(|class| class.static_function(&name).is_some())
                .unwrap_or(false);
            if in_array || is_static || data.own(&name).is_some() {
                return true;
            }
            current = self.as_object(data.prototype);
        }
        false
    }

    fn property_names(&mut self, object: ObjectRef) -> Vec<String> {
        let mut names = match self.object(object) {
            Some(data) => {
                let mut names: Vec<String> = match &data.kind {
                    ObjectKind::Array(elements) => {
                        elements.indices().map(|index| index.to_string()).collect()
                    }
                    _ => Vec::new(),
                };
                names.extend(
                    data.properties
                        .iter()
                        .filter(|(_, property)| !property.attributes.dont_enum)
                        .map(|(name, _)| name.clone()),
                );
                names
            }
            None => return Vec::new(),
        };

        let enumerate = self
            .class_of(object)
            .and_then(|class| class.property_names_hook().cloned());
        if let Some(enumerate) = enumerate {
            for name in enumerate(self, object) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    fn is_instance_of(
        &mut self,
        value: Value,
        constructor: ObjectRef,
        exception: &mut ExceptionSlot,
    ) -> bool {
        let callable = matches!(
            self.object(constructor).map(|data| &data.kind),
            Some(ObjectKind::Function { .. })
        );
        if !callable {
            self.throw_type_error("Right hand side of instanceof is not callable", exception);
            return false;
        }
        let Some(target) = self
            .plain_get(constructor, "prototype")
            .and_then(|prototype| self.as_object(prototype))
        else {
            self.throw_type_error("Function has non-object prototype in instanceof check", exception);
            return false;
        };

        let Some(object) = self.as_object(value) else {
            return false;
        };
        let mut visited = HashSet::new();
        let mut current = self.as_object(self.prototype(object));
        while let Some(prototype) = current {
            if prototype == target {
                return true;
            }
            if !visited.insert(prototype.as_value()) {
                break;
            }
            current = self.as_object(self.prototype(prototype));
        }
        false
    }

    fn call_function(
        &mut self,
        function: ObjectRef,
        this: Option<ObjectRef>,
        arguments: &[Value],
        exception: &mut ExceptionSlot,
    ) -> Value {
        let callback = match self.object(function).map(|data| &data.kind) {
            Some(ObjectKind::Function { callback, .. }) => Rc::clone(callback),
            _ => {
                self.throw_type_error("Value is not a function", exception);
                return UNDEFINED;
            }
        };
        if self.call_depth >= self.config.max_call_depth {
            self.throw_error("RangeError", "Maximum call stack size exceeded", exception);
            return UNDEFINED;
        }

        let this = this.unwrap_or(self.global);
        self.call_depth += 1;
        let result = callback(self, this, arguments, exception);
        self.call_depth -= 1;

        if exception.is_set() {
            UNDEFINED
        } else {
            result
        }
    }

    fn global_object(&self) -> ObjectRef {
        self.global
    }

    // ==================== 类 ====================

    fn class_create(&mut self, definition: ClassDefinition) -> ClassRef {
        let class = ClassRef::from_raw(self.classes.len() as u32);
        self.classes.push(definition);
        class
    }

    fn class_definition(&self, class: ClassRef) -> Option<&ClassDefinition> {
        self.classes.get(class.raw() as usize)
    }

    // ==================== 生命周期 ====================

    fn protect(&mut self, value: Value) {
        *self.protected.entry(value).or_insert(0) += 1;
    }

    fn unprotect(&mut self, value: Value) {
        match self.protected.get_mut(&value) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.protected.remove(&value);
            }
            None => tracing::warn!(
                target: "script_bridge::engine",
                value = value.raw(),
                "Unprotect of a value that is not protected"
            ),
        }
    }

    fn garbage_collect(&mut self) {
        let mut marked = vec![false; self.cells.len()];
        let mut pending: Vec<Value> = (0..PERMANENT_CELLS)
            .map(|index| handle(index, 0))
            .chain(self.intrinsics.iter().copied())
            .chain(self.protected.keys().copied())
            .collect();

        while let Some(value) = pending.pop() {
            // 过期句柄不标记任何槽位
            let Some(cell) = self.cell(value) else {
                continue;
            };
            let (index, _) = split_handle(value);
            if marked[index] {
                continue;
            }
            marked[index] = true;
            if let Cell::Object(data) = cell {
                pending.push(data.prototype);
                pending.extend(data.properties.iter().map(|(_, property)| property.value));
                pending.extend(data.statics.values().copied());
                if let ObjectKind::Array(elements) = &data.kind {
                    pending.extend(elements.values());
                }
            }
        }

        let mut collected_objects = 0usize;
        let mut collected_values = 0usize;
        let mut finalized = 0usize;
        for (index, reachable) in marked.iter().enumerate().skip(PERMANENT_CELLS) {
            if *reachable {
                continue;
            }
            let entry = &mut self.cells[index];
            let Some(cell) = entry.cell.take() else {
                continue;
            };
            entry.generation = entry.generation.wrapping_add(1);
            self.free.push(index);
            match cell {
                Cell::Object(data) => {
                    self.live_objects -= 1;
                    collected_objects += 1;
                    if finalize_object(&self.classes, *data) {
                        finalized += 1;
                    }
                }
                _ => collected_values += 1,
            }
        }

        tracing::debug!(
            target: "script_bridge::engine",
            collected_objects,
            collected_values,
            finalized,
            live_objects = self.live_objects,
            free_slots = self.free.len(),
            "Garbage collection finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessors;
    use crate::class::ClassBuilder;
    use crate::exception::capture_from_engine;
    use crate::string_bridge;
    use crate::wrapper::wrap;
    use std::cell::Cell as Counter;

    fn render(engine: &mut MemoryEngine, value: Value) -> String {
        let mut slot = ExceptionSlot::new();
        let text = engine.to_string_copy(value, &mut slot).unwrap();
        string_bridge::take_native(engine, text)
    }

    #[test]
    fn test_bootstrap_globals() {
        let mut engine = MemoryEngine::new();
        assert_eq!(engine.live_objects(), BOOTSTRAP_OBJECTS);
        let global = engine.global_object();
        for name in ["Object", "Array", "Error"] {
            let constructor = accessors::object_property(&mut engine, global, name, None).unwrap();
            assert!(accessors::object_property(&mut engine, constructor, "prototype", None).is_ok());
        }
        // 内建构造函数不可枚举
        assert!(engine.property_names(global).is_empty());
    }

    #[test]
    fn test_primitive_conversions() {
        let mut engine = MemoryEngine::new();
        let mut slot = ExceptionSlot::new();
        let cases = [(" 42 ", 42.0), ("", 0.0), ("1.5e3", 1500.0), ("-Infinity", f64::NEG_INFINITY)];
        for (text, expected) in cases {
            let value = string_bridge::value_for_string(&mut engine, text);
            assert_eq!(engine.to_number(value, &mut slot), expected);
        }
        let junk = string_bridge::value_for_string(&mut engine, "12px");
        assert!(engine.to_number(junk, &mut slot).is_nan());
        let null = engine.null();
        assert_eq!(engine.to_number(null, &mut slot), 0.0);
        assert!(!slot.is_set());
    }

    #[test]
    fn test_rendering() {
        let mut engine = MemoryEngine::new();
        let mut slot = ExceptionSlot::new();
        let three = engine.make_number(3.0);
        let half = engine.make_number(0.5);
        let undefined = engine.undefined();
        let array = engine.make_array(&[three, undefined, half], &mut slot).unwrap();
        let plain = engine.make_object(None, None, &mut slot).unwrap();

        assert_eq!(render(&mut engine, three), "3");
        assert_eq!(render(&mut engine, array.into()), "3,,0.5");
        assert_eq!(render(&mut engine, plain.into()), "[object Object]");
        assert_eq!(render(&mut engine, undefined), "undefined");
    }

    #[test]
    fn test_self_referencing_array_renders() {
        let mut engine = MemoryEngine::new();
        let array = engine.make_array(&[], &mut ExceptionSlot::new()).unwrap();
        accessors::set_element(&mut engine, array, 0, array.into()).unwrap();
        assert_eq!(render(&mut engine, array.into()), "");
    }

    #[test]
    fn test_strict_equality() {
        let mut engine = MemoryEngine::new();
        let a = engine.make_number(1.0);
        let b = engine.make_number(1.0);
        let nan = engine.make_number(f64::NAN);
        let s = string_bridge::value_for_string(&mut engine, "1");
        assert!(engine.strict_equals(a, b));
        assert!(!engine.strict_equals(a, s));
        assert!(!engine.strict_equals(nan, nan));

        let mut slot = ExceptionSlot::new();
        let x = engine.make_object(None, None, &mut slot).unwrap();
        let y = engine.make_object(None, None, &mut slot).unwrap();
        assert!(!engine.strict_equals(x.into(), y.into()));
    }

    #[test]
    fn test_handles_are_never_reused() {
        let mut engine = MemoryEngine::new();
        let mut slot = ExceptionSlot::new();
        let first = engine.make_object(None, None, &mut slot).unwrap();
        engine.garbage_collect();
        let slots = engine.heap_slots();
        let second = engine.make_object(None, None, &mut slot).unwrap();
        // 槽位被复用，句柄的代数不同
        assert_eq!(engine.heap_slots(), slots);
        assert_ne!(first, second);
        assert_eq!(engine.value_kind(first.into()), ValueKind::Undefined);
        assert_eq!(engine.value_kind(second.into()), ValueKind::Object);

        let name = engine.string_create("x");
        engine.get_property(first, name, &mut slot);
        engine.string_release(name);
        assert!(slot.is_set());
    }

    #[test]
    fn test_heap_slots_bounded_across_collections() {
        let mut engine = MemoryEngine::new();
        let array = engine.make_array(&[TRUE], &mut ExceptionSlot::new()).unwrap();
        engine.protect(array.into());

        let churn = |engine: &mut MemoryEngine| {
            for i in 0..500 {
                engine.make_number(i as f64);
                accessors::array_length(&mut *engine, array).unwrap();
                engine.make_object(None, None, &mut ExceptionSlot::new()).unwrap();
            }
            engine.garbage_collect();
        };

        churn(&mut engine);
        let high_water = engine.heap_slots();
        for _ in 0..20 {
            churn(&mut engine);
        }
        assert_eq!(engine.heap_slots(), high_water);
        assert_eq!(engine.live_objects(), BOOTSTRAP_OBJECTS + 1);
    }

    #[test]
    fn test_stale_protect_does_not_pin_reused_slot() {
        let mut engine = MemoryEngine::new();
        let mut slot = ExceptionSlot::new();
        let first = engine.make_object(None, None, &mut slot).unwrap();
        engine.garbage_collect();
        // 对过期句柄的保护不影响复用该槽位的新对象
        engine.protect(first.into());
        let second = engine.make_object(None, None, &mut slot).unwrap();
        engine.garbage_collect();
        assert_eq!(engine.value_kind(second.into()), ValueKind::Undefined);
        engine.unprotect(first.into());
    }

    #[test]
    fn test_sparse_elements_merge_into_prefix() {
        let mut engine = MemoryEngine::new();
        let mut slot = ExceptionSlot::new();
        let array = engine.make_array(&[], &mut slot).unwrap();
        let one = engine.make_number(1.0);
        let two = engine.make_number(2.0);

        engine.set_property_at_index(array, 2000, two, &mut slot);
        engine.set_property_at_index(array, 1000, one, &mut slot);
        engine.set_property_at_index(array, 1999, one, &mut slot);
        assert!(!slot.is_set());

        let at = |engine: &mut MemoryEngine, index: u32| {
            engine.get_property_at_index(array, index, &mut ExceptionSlot::new())
        };
        let v2000 = at(&mut engine, 2000);
        assert!(engine.strict_equals(v2000, two));
        let v1999 = at(&mut engine, 1999);
        assert!(engine.strict_equals(v1999, one));
        let v1500 = at(&mut engine, 1500);
        assert_eq!(engine.value_kind(v1500), ValueKind::Undefined);
        assert_eq!(accessors::array_length(&mut engine, array).unwrap(), 2001);
        assert_eq!(engine.property_names(array).len(), 2001);

        for (name, expected) in [("2000", true), ("2001", false)] {
            let key = engine.string_create(name);
            assert_eq!(engine.has_property(array, key), expected, "{}", name);
            engine.string_release(key);
        }
    }

    #[test]
    fn test_huge_array_to_string_throws_range_error() {
        let mut engine = MemoryEngine::new();
        let mut slot = ExceptionSlot::new();
        let array = engine.make_array(&[], &mut slot).unwrap();
        let length = engine.make_number(f64::from(u32::MAX));
        accessors::set_property(&mut engine, array, "length", length, PropertyAttributes::NONE)
            .unwrap();

        assert!(engine.to_string_copy(array.into(), &mut slot).is_none());
        let thrown = capture_from_engine(&mut engine, &mut slot).unwrap();
        assert_eq!(thrown.message(), "RangeError: Invalid string length");
    }

    #[test]
    fn test_unknown_string_handle_is_logged() {
        use std::io;
        use std::sync::{Arc, Mutex};

        #[derive(Clone, Default)]
        struct Captured(Arc<Mutex<Vec<u8>>>);

        impl io::Write for Captured {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut engine = MemoryEngine::new();
            let name = engine.string_create("schema");
            engine.string_release(name);
            assert_eq!(engine.string_to_utf8(name), "");
            let value = engine.make_string(name);
            assert_eq!(render(&mut engine, value), "");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert_eq!(output.matches("Read of an unknown string handle").count(), 2);
    }

    #[test]
    fn test_object_limit_throws_range_error() {
        let config = HeapConfig {
            max_objects: BOOTSTRAP_OBJECTS + 1,
            ..HeapConfig::default()
        };
        let mut engine = MemoryEngine::with_config(config);
        let mut slot = ExceptionSlot::new();
        assert!(engine.make_object(None, None, &mut slot).is_some());
        assert!(engine.make_object(None, None, &mut slot).is_none());
        let thrown = capture_from_engine(&mut engine, &mut slot).unwrap();
        assert_eq!(
            thrown.message(),
            "RangeError: Out of memory: live object limit reached"
        );
    }

    #[test]
    fn test_call_depth_limit() {
        let config = HeapConfig {
            max_call_depth: 8,
            ..HeapConfig::default()
        };
        let mut engine = MemoryEngine::with_config(config);
        let recurse: NativeCallback = Rc::new(
            |engine: &mut dyn EngineApi,
             this: ObjectRef,
             arguments: &[Value],
             exception: &mut ExceptionSlot| {
                let name = engine.string_create("recurse");
                let function = engine.get_property(this, name, exception);
                engine.string_release(name);
                match engine.to_object(function, exception) {
                    Some(function) => engine.call_function(function, Some(this), arguments, exception),
                    None => engine.undefined(),
                }
            },
        );
        let mut slot = ExceptionSlot::new();
        let name = engine.string_create("recurse");
        let function = engine.make_function(name, recurse, &mut slot).unwrap();
        let global = engine.global_object();
        engine.set_property(global, name, function.into(), PropertyAttributes::NONE, &mut slot);
        engine.string_release(name);

        engine.call_function(function, None, &[], &mut slot);
        let thrown = capture_from_engine(&mut engine, &mut slot).unwrap();
        assert_eq!(thrown.message(), "RangeError: Maximum call stack size exceeded");
    }

    #[test]
    fn test_prototype_chain_lookup_and_cycles() {
        let mut engine = MemoryEngine::new();
        let mut slot = ExceptionSlot::new();
        let base = engine.make_object(None, None, &mut slot).unwrap();
        let derived = engine.make_object(None, None, &mut slot).unwrap();
        let seven = engine.make_number(7.0);
        accessors::set_property(&mut engine, base, "size", seven, PropertyAttributes::NONE).unwrap();
        engine.set_prototype(derived, base.into());
        assert_eq!(accessors::number_property(&mut engine, derived, "size").unwrap(), 7.0);

        engine.set_prototype(base, derived.into());
        let missing = accessors::property(&mut engine, derived, "missing").unwrap();
        assert_eq!(engine.value_kind(missing), ValueKind::Undefined);
    }

    #[test]
    fn test_has_property() {
        let mut engine = MemoryEngine::new();
        let mut slot = ExceptionSlot::new();
        let array = engine.make_array(&[TRUE], &mut slot).unwrap();
        for (name, expected) in [("length", true), ("0", true), ("1", false), ("constructor", true)] {
            let key = engine.string_create(name);
            assert_eq!(engine.has_property(array, key), expected, "{}", name);
            engine.string_release(key);
        }
    }

    #[test]
    fn test_property_names_skip_hidden() {
        let mut engine = MemoryEngine::new();
        let object = engine.make_object(None, None, &mut ExceptionSlot::new()).unwrap();
        let one = engine.make_number(1.0);
        accessors::set_property(&mut engine, object, "visible", one, PropertyAttributes::NONE)
            .unwrap();
        accessors::set_property(&mut engine, object, "hidden", one, PropertyAttributes::HIDDEN)
            .unwrap();
        assert_eq!(engine.property_names(object), vec!["visible".to_string()]);
    }

    #[test]
    fn test_error_constructor_callable() {
        let mut engine = MemoryEngine::new();
        let global = engine.global_object();
        let constructor = accessors::object_property(&mut engine, global, "Error", None).unwrap();
        let message = string_bridge::value_for_string(&mut engine, "bad schema");
        let error = accessors::call_function(&mut engine, constructor, None, &[message]).unwrap();
        assert_eq!(render(&mut engine, error), "Error: bad schema");
        assert!(accessors::instance_of(&mut engine, error, "Error").unwrap());
    }

    #[test]
    fn test_unprotect_is_balanced() {
        let mut engine = MemoryEngine::new();
        let object = engine.make_object(None, None, &mut ExceptionSlot::new()).unwrap();
        engine.protect(object.into());
        engine.protect(object.into());
        engine.unprotect(object.into());
        engine.garbage_collect();
        assert_eq!(engine.value_kind(object.into()), ValueKind::Object);
        engine.unprotect(object.into());
        engine.garbage_collect();
        assert_eq!(engine.value_kind(object.into()), ValueKind::Undefined);
    }

    #[test]
    fn test_drop_finalizes_live_instances() {
        struct Flag(Rc<Counter<usize>>);
        impl Drop for Flag {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let drops = Rc::new(Counter::new(0));
        {
            let mut engine = MemoryEngine::new();
            let class = ClassBuilder::new("Flag").build(&mut engine);
            let object = wrap(&mut engine, class, Flag(Rc::clone(&drops)), None).unwrap();
            engine.protect(object.into());
            engine.garbage_collect();
            assert_eq!(drops.get(), 0);
        }
        assert_eq!(drops.get(), 1);
    }
}
