// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

// 构建脚本: 启用 ffmpeg 特性时链接 FFmpeg 静态库的系统依赖
fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let ffmpeg = std::env::var_os("CARGO_FEATURE_FFMPEG").is_some();
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_env = std::env::var("CARGO_CFG_TARGET_ENV").unwrap_or_default();

    // 仅 Windows MSVC (vcpkg 静态库) 需要
    if ffmpeg && target_os == "windows" && target_env == "msvc" {
        // Intel QSV 硬件加速
        println!("cargo:rustc-link-lib=dylib=libmfx");
        // x264 编码器
        println!("cargo:rustc-link-lib=dylib=libx264");
        // OLE 自动化和VFW (DirectShow 摄像头)
        println!("cargo:rustc-link-lib=dylib=oleaut32");
        println!("cargo:rustc-link-lib=dylib=vfw32");
        // Secure Channel (TLS)
        println!("cargo:rustc-link-lib=dylib=secur32");
    }
}
