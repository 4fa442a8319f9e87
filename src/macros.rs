//! 内部宏

/// 以字段列表的形式实现 `Default`
///
/// ```rust,ignore
/// impl_default!(HeapConfig {
///     initial_capacity: 256,
///     max_objects: 1 << 20,
///     max_call_depth: 256,
/// });
/// ```
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}

pub(crate) use impl_default;
