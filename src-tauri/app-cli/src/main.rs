//! 画廊命令行工具
//!
//! 目前支持：
//! - `list`：列出服务端所有图片的展示地址
//! - `upload <PATH>`：上传本地图片，stderr 上实时显示进度，Ctrl+C 取消
//! - `delete <REFERENCE>`：按引用删除图片（引用的最后一段即服务端文件名）
//! - `url <REFERENCE>`：打印引用对应的展示地址（不发请求）
//!
//! 日志级别通过 `RUST_LOG` 控制，默认 `warn`。

use clap::{Args, Parser, Subcommand};
use gallery_core::{
    GalleryClient, GalleryConfig, GalleryEvent, GalleryEventKind, ImageReference, Operation,
    SelectedFile,
};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gallery-cli")]
#[command(version)]
#[command(about = "图片画廊命令行客户端（列表/上传/删除）", long_about = None)]
struct Cli {
    /// JSON 配置文件（字段见 GalleryConfig，缺省字段使用默认值）
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// 存储服务地址，覆盖配置文件中的 apiBase
    #[arg(long = "api-url", global = true)]
    api_url: Option<String>,

    /// 以 JSON 输出列表（原始引用）
    #[arg(long = "json", global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 列出所有图片
    List,
    /// 上传一张图片
    Upload(UploadArgs),
    /// 删除一张图片
    Delete(DeleteArgs),
    /// 打印展示地址
    Url(UrlArgs),
}

#[derive(Args, Debug)]
struct UploadArgs {
    /// 本地图片路径
    path: PathBuf,
}

#[derive(Args, Debug)]
struct DeleteArgs {
    /// 图片引用（如 /static/images/xxx.png）或文件名
    reference: String,
}

#[derive(Args, Debug)]
struct UrlArgs {
    reference: String,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create tokio runtime: {e}");
        std::process::exit(1);
    });

    if let Err(e) = rt.block_on(run(cli)) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<GalleryConfig, String> {
    let config = match &cli.config {
        Some(path) => GalleryConfig::load(path).map_err(|e| e.to_string())?,
        None => GalleryConfig::default(),
    };
    match &cli.api_url {
        Some(url) => config.with_api_base(url).map_err(|e| e.to_string()),
        None => Ok(config),
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = load_config(&cli)?;
    tracing::debug!(api_base = %config.api_base, "using storage service");
    let client = GalleryClient::new(config).map_err(|e| e.to_string())?;

    match cli.command {
        Commands::List => {
            let images = client
                .list()
                .await
                .map_err(|e| e.user_message(Operation::List))?;
            print_images(&client, &images, cli.json)
        }
        Commands::Upload(args) => upload(&client, args, cli.json).await,
        Commands::Delete(args) => {
            let reference = ImageReference::new(args.reference);
            let images = client
                .delete(&reference)
                .await
                .map_err(|e| e.user_message(Operation::Delete))?;
            println!("deleted: {}", reference);
            print_images(&client, &images, cli.json)
        }
        Commands::Url(args) => {
            println!("{}", client.display_url(&ImageReference::new(args.reference)));
            Ok(())
        }
    }
}

async fn upload(client: &GalleryClient, args: UploadArgs, json: bool) -> Result<(), String> {
    let file = SelectedFile::from_path(&args.path)
        .await
        .map_err(|e| e.user_message(Operation::Upload))?;
    client
        .select_file(file)
        .await
        .map_err(|e| e.user_message(Operation::Upload))?;

    // 进度事件在 stderr 上原地刷新
    let mut progress_rx = client.subscribe(GalleryEventKind::UploadProgress);
    let printer = tokio::spawn(async move {
        while let Ok((_, event)) = progress_rx.recv().await {
            if let GalleryEvent::UploadProgress { progress } = &*event {
                eprint!("\rUploading... {:>3}%", progress.percent);
                let _ = std::io::stderr().flush();
                if progress.percent == 100 {
                    break;
                }
            }
        }
    });

    let handle = client
        .start_upload()
        .await
        .map_err(|e| e.user_message(Operation::Upload))?;
    let canceller = handle.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let result = handle.wait().await;
    printer.abort();
    eprintln!();

    let outcome = result.map_err(|e| e.user_message(Operation::Upload))?;
    if let Some(reference) = &outcome.reference {
        println!("uploaded: {}", client.display_url(reference));
    }
    if !outcome.resynced {
        if let Some(message) = client.error().await {
            eprintln!("{message}");
        }
    }
    print_images(client, &outcome.images, json)
}

fn print_images(client: &GalleryClient, images: &[ImageReference], json: bool) -> Result<(), String> {
    if json {
        let out = serde_json::to_string_pretty(images)
            .map_err(|e| format!("Failed to serialize images: {e}"))?;
        println!("{out}");
        return Ok(());
    }
    if images.is_empty() {
        println!("(no images)");
        return Ok(());
    }
    for image in images {
        println!("{}", client.display_url(image));
    }
    Ok(())
}
