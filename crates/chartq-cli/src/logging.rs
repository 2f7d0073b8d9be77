//! tracing の初期化
//!
//! `RUST_LOG` があればそれを優先し、なければ `--log-level` を使います。
//! stdout はコマンドの出力（JSON）専用なので、ログは stderr に書きます。

use tracing_subscriber::EnvFilter;

pub fn init_tracing(level: &str, json: bool) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
