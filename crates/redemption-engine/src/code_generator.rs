//! 兑换码生成器
//!
//! 兑换码为 8 位大写字母与数字组合，用于线下出示核销。
//! 生成器本身不保证唯一性：服务层先查询账本，提交时再由存储层唯一约束兜底，
//! 碰撞时重新生成。

use rand::Rng;

/// 兑换码长度
pub const CODE_LENGTH: usize = 8;

/// 兑换码字符集
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// 兑换码生成器接口
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// 均匀随机兑换码生成器
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::rng();
        (0..CODE_LENGTH)
            .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }
}

/// 检查兑换码格式
pub fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
}
