//! 原生入口的参数数量检查

use std::fmt;

use crate::exception::{BridgeResult, NativeException};

/// 允许的参数数量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentCount {
    Exactly(usize),
    Range { min: usize, max: usize },
}

impl fmt::Display for ArgumentCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentCount::Exactly(count) => write!(f, "{}", count),
            ArgumentCount::Range { min, max } => write!(f, "between {} and {}", min, max),
        }
    }
}

pub fn validate_argument_count(actual: usize, expected: usize) -> BridgeResult<()> {
    if actual != expected {
        return Err(NativeException::Argument {
            expected: ArgumentCount::Exactly(expected),
            actual,
        });
    }
    Ok(())
}

pub fn validate_argument_range(actual: usize, min: usize, max: usize) -> BridgeResult<()> {
    if actual < min || actual > max {
        return Err(NativeException::Argument {
            expected: ArgumentCount::Range { min, max },
            actual,
        });
    }
    Ok(())
}
