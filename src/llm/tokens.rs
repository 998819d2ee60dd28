//! Token 估算（简单的字符计数近似，用于判断是否需要预先压缩）

use crate::memory::ChatMessage;

/// 每条消息的格式开销（<|start|>{role}\n{content}<|end|>\n）
const TOKENS_PER_MESSAGE: usize = 4;
/// 每个回复的 assistant 前缀
const TOKENS_PER_REPLY: usize = 3;

pub struct TokenEstimator;

impl TokenEstimator {
    /// 估算文本的 token 数量：英文约 4 字符/token，非 ASCII 约 1.5 字符/token
    pub fn estimate(text: &str) -> usize {
        let mut ascii_chars = 0;
        let mut non_ascii_chars = 0;

        for c in text.chars() {
            if c.is_ascii() {
                ascii_chars += 1;
            } else {
                non_ascii_chars += 1;
            }
        }

        let tokens = ascii_chars / 4 + (non_ascii_chars as f64 / 1.5).ceil() as usize;
        tokens.max(1)
    }

    /// 估算整段历史的 token 数
    pub fn estimate_history(history: &[ChatMessage]) -> usize {
        history
            .iter()
            .map(|m| TOKENS_PER_MESSAGE + Self::estimate(m.text()))
            .sum::<usize>()
            + TOKENS_PER_REPLY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_ascii() {
        assert_eq!(TokenEstimator::estimate("abcdefgh"), 2);
        assert_eq!(TokenEstimator::estimate(""), 1);
    }

    #[test]
    fn test_estimate_non_ascii() {
        assert_eq!(TokenEstimator::estimate("应急响应"), 3);
    }

    #[test]
    fn test_estimate_history_adds_overhead() {
        let history = vec![ChatMessage::system("abcd"), ChatMessage::user("abcdefgh")];
        assert_eq!(TokenEstimator::estimate_history(&history), (4 + 1) + (4 + 2) + 3);
    }
}
