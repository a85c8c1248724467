//! 入参校验

use crate::error::{RedemptionError, Result};

/// 标识符最大长度
pub const MAX_ID_LEN: usize = 128;

/// 校验外部传入的标识符
///
/// 要求非空、不超过 MAX_ID_LEN 个字符、不含空白或控制字符。
pub fn validate_id(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(RedemptionError::Validation(format!("{} 不能为空", field)));
    }
    if value.chars().count() > MAX_ID_LEN {
        return Err(RedemptionError::Validation(format!(
            "{} 长度超过 {} 个字符",
            field, MAX_ID_LEN
        )));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(RedemptionError::Validation(format!(
            "{} 包含非法字符",
            field
        )));
    }
    Ok(())
}

/// 校验积分数量为正
pub fn validate_points(points: i64) -> Result<()> {
    if points <= 0 {
        return Err(RedemptionError::Validation(format!(
            "积分数量必须为正数: {}",
            points
        )));
    }
    Ok(())
}
