//! 图片引用：服务端返回的 URL 或路径字符串，既用于展示，也用于推导删除用的存储键。

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageReference(String);

impl ImageReference {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// 存储键：最后一个路径段（忽略 `?query` 与 `#fragment`），为空时返回 None。
    pub fn storage_key(&self) -> Option<&str> {
        let end = self.0.find(['?', '#']).unwrap_or(self.0.len());
        let path = &self.0[..end];
        let key = path.rsplit('/').next().unwrap_or(path);
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    }

    /// 绝对 http(s) 地址原样返回；否则拼接到 `base` 上（缺少前导 `/` 时补上）。
    pub fn display_url(&self, base: &Url) -> String {
        if is_absolute_http(&self.0) {
            return self.0.clone();
        }
        let base = base.as_str().trim_end_matches('/');
        if self.0.starts_with('/') {
            format!("{}{}", base, self.0)
        } else {
            format!("{}/{}", base, self.0)
        }
    }
}

fn is_absolute_http(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ImageReference {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for ImageReference {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ImageReference {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
