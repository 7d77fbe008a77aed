use anyhow::Result;
use pdf_purger::utils::logging;
use pdf_purger::{App, Config};
use std::path::PathBuf;

const DEFAULT_CONFIG_FILE: &str = "purger.toml";
const REMOVE_FLAG: &str = "--remove";

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config_path =
        std::env::var("PURGER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    let config = Config::load(&config_path)?;

    // 初始化日志
    logging::init(&config)?;

    // 命令行参数：`<folder>...` 注册文件夹；`--remove <folder>...` 从注册表移除后退出
    let mut args = std::env::args_os().skip(1).peekable();
    let mut app = App::initialize(config)?;
    if args.peek().is_some_and(|arg| arg == REMOVE_FLAG) {
        app.unregister_folders(args.skip(1).map(PathBuf::from))?;
        return Ok(());
    }
    app.register_folders(args.map(PathBuf::from))?;
    app.run().await?;

    Ok(())
}
