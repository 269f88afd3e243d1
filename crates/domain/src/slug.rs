//! 生成记录的公开访问 slug
//!
//! slug = prompt 前 10 个词 slugify 后的前缀 + `-` + 6 位随机十六进制后缀。
//! 相同 prompt 反复提交时依靠随机后缀区分。

use uuid::Uuid;

pub const SLUG_PREFIX_WORDS: usize = 10;
pub const SLUG_SUFFIX_LEN: usize = 6;
const FALLBACK_PREFIX: &str = "generation";

/// 转为小写, 非字母数字字符折叠为单个 `-`, 去掉首尾 `-`
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

pub fn generate_slug(prompt: &str) -> String {
    let short_prompt = prompt
        .split_whitespace()
        .take(SLUG_PREFIX_WORDS)
        .collect::<Vec<_>>()
        .join(" ");
    let mut base = slugify(&short_prompt);
    if base.is_empty() {
        base = FALLBACK_PREFIX.to_string();
    }
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{base}-{}", &suffix[..SLUG_SUFFIX_LEN])
}
