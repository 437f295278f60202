// 该文件是 Kanjian （看见） 项目的一部分。
// src/utils.rs - 工具函数
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::PathBuf;
use std::string::FromUtf8Error;

use url::Url;

/// 取出 URL 中的文件路径（百分号解码后）
pub fn url_file_path(url: &Url) -> Result<PathBuf, FromUtf8Error> {
  let decoded = urlencoding::decode(url.path())?;
  Ok(PathBuf::from(decoded.into_owned()))
}

/// URL 查询参数中是否出现了指定的键
pub fn has_query_key(url: &Url, key: &str) -> bool {
  url.query_pairs().any(|(k, _)| k == key)
}

/// 读取 URL 查询参数中指定键的值
pub fn query_value(url: &Url, key: &str) -> Option<String> {
  url
    .query_pairs()
    .find(|(k, _)| k == key)
    .map(|(_, v)| v.into_owned())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decodes_percent_encoded_paths() {
    let url = Url::parse("image:///tmp/my%20frames/a.png").unwrap();
    assert_eq!(
      url_file_path(&url).unwrap(),
      PathBuf::from("/tmp/my frames/a.png")
    );
  }

  #[test]
  fn reads_query_pairs() {
    let url = Url::parse("folder:///tmp/out?record&repeat=3").unwrap();
    assert!(has_query_key(&url, "record"));
    assert!(!has_query_key(&url, "always"));
    assert_eq!(query_value(&url, "repeat").as_deref(), Some("3"));
    assert_eq!(query_value(&url, "missing"), None);
  }
}
