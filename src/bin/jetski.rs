// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// JetSki 检测训练与跟踪
///
/// 主程序入口 - 直接运行: cargo run --bin jetski --release -- <视频源>
use anyhow::Result;
use clap::Parser;
use jetski_tracker::{bootstrap_application, Args, JetSkiTrackingApp, WorkflowSummary};
use mimalloc::MiMalloc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("jetski_tracker=info,ort=warn")),
        )
        .init();

    let args = Args::parse();
    info!("🚤 JetSki Tracker 启动");

    let (app, workspace) = bootstrap_application(&args)?;
    let result = run(&args, app);

    if args.keep_workdir {
        workspace.keep();
    } else if let Err(e) = workspace.close() {
        warn!("⚠️ 清理工作目录失败: {}", e);
    }

    let summary = result?;
    info!(
        "✅ 完成: 模型 {} | 处理 {} 帧 | {}",
        summary.trained.weights.display(),
        summary.frames_processed,
        summary.stop_reason
    );
    Ok(())
}

#[cfg(feature = "window")]
fn run(args: &Args, mut app: JetSkiTrackingApp) -> Result<WorkflowSummary> {
    use jetski_tracker::display::{run_window, StopSignal, WindowDisplay};

    if args.headless {
        return Ok(app.execute_workflow(&args.source)?);
    }

    // macroquad 占用主线程,流程在工作线程执行
    let stop = StopSignal::new();
    let (display, frames) = WindowDisplay::channel(stop.clone());
    app.set_display(Box::new(display));

    let source = args.source.clone();
    let worker = std::thread::Builder::new()
        .name("workflow".into())
        .spawn(move || app.execute_workflow(&source))?;

    run_window(frames, stop);

    match worker.join() {
        Ok(result) => Ok(result?),
        Err(_) => anyhow::bail!("workflow thread panicked"),
    }
}

#[cfg(not(feature = "window"))]
fn run(args: &Args, mut app: JetSkiTrackingApp) -> Result<WorkflowSummary> {
    if !args.headless {
        info!("ℹ️ 未启用 window 特性,以无窗口模式运行");
    }
    Ok(app.execute_workflow(&args.source)?)
}
