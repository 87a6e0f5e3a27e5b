mod commands;
mod utils;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tier")]
#[command(about = "宣言する。つながる。インフラは、依存グラフになった。", long_about = None)]
struct Cli {
    /// スタックファイルのパス（省略時はカレントディレクトリから検索）
    #[arg(short, long, global = true, env = "TIERFLOW_STACK_PATH")]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// プロビジョニングエンジン
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineKind {
    /// ローカルの状態ファイルに反映（クラウド API を呼ばない）
    Local,
    /// terraform CLI で反映
    Terraform,
}

/// グラフの出力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    Text,
    Dot,
}

#[derive(Subcommand)]
enum Commands {
    /// スタックを検証
    Validate,
    /// エンジン形式（main.tf.json）を出力
    Synth {
        /// 出力ディレクトリ
        #[arg(short, long, default_value = "out")]
        out: PathBuf,
    },
    /// リソース依存グラフを表示
    Graph {
        /// 出力形式
        #[arg(long, value_enum, default_value = "text")]
        format: GraphFormat,
    },
    /// 変更内容を表示
    Plan {
        /// 使用するエンジン（省略時はユーザー設定、なければ local）
        #[arg(short, long, value_enum)]
        engine: Option<EngineKind>,
        /// 変更がなくても再作成するリソースのアドレス
        #[arg(long = "replace", value_name = "ADDR")]
        replace: Vec<String>,
    },
    /// 変更を適用
    Apply {
        /// 使用するエンジン
        #[arg(short, long, value_enum)]
        engine: Option<EngineKind>,
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
        /// 変更がなくても再作成するリソースのアドレス
        #[arg(long = "replace", value_name = "ADDR")]
        replace: Vec<String>,
    },
    /// スタックの全リソースを削除
    Destroy {
        /// 使用するエンジン
        #[arg(short, long, value_enum)]
        engine: Option<EngineKind>,
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// 公開出力を表示
    Output {
        /// 使用するエンジン
        #[arg(short, long, value_enum)]
        engine: Option<EngineKind>,
        /// JSON で出力
        #[arg(long)]
        json: bool,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログは stderr に出力（stdout はコマンド出力用）
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Versionコマンドはスタックファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("tierflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let stack_path = utils::resolve_stack_path(cli.file)?;

    match cli.command {
        Commands::Validate => {
            commands::validate::handle(&stack_path)?;
        }
        Commands::Synth { out } => {
            commands::synth::handle(&stack_path, &out)?;
        }
        Commands::Graph { format } => {
            commands::graph::handle(&stack_path, format)?;
        }
        Commands::Plan { engine, replace } => {
            commands::plan::handle(&stack_path, engine, replace).await?;
        }
        Commands::Apply {
            engine,
            yes,
            replace,
        } => {
            commands::apply::handle(&stack_path, engine, yes, replace).await?;
        }
        Commands::Destroy { engine, yes } => {
            commands::destroy::handle(&stack_path, engine, yes).await?;
        }
        Commands::Output { engine, json } => {
            commands::output::handle(&stack_path, engine, json).await?;
        }
        Commands::Version => {
            unreachable!("Version is handled before stack loading");
        }
    }

    Ok(())
}
