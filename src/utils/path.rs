/// 路径工具
use std::path::Path;

/// 用于消息显示的文件名；没有文件名部分时返回整个路径
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or(path.as_os_str())
        .to_string_lossy()
        .to_string()
}
