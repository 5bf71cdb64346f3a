use clap::Parser;
use labelscout::{cli, launch, logging};
use tracing::error;

#[tokio::main]
async fn main() {
    let args = cli::Args::parse();
    let title = args.title.clone();

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ 配置加载失败: {:#}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = logging::init(config.verbose) {
        eprintln!("⚠️ 日志初始化失败: {:#}", e);
    }

    match launch(&title, &config).await {
        Ok(report) => println!("{}", report),
        Err(e) => {
            error!("❌ Pipeline运行失败: {:#}", e);
            eprintln!("Research run failed. See logs for details.");
            std::process::exit(1);
        }
    }
}
