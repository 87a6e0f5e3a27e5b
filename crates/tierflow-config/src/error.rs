use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error(
        "スタックファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: stack.kdl, stack.local.kdl, .stack.kdl, .stack.local.kdl\n\
        - ./.tierflow/ ディレクトリ\n\
        または TIERFLOW_STACK_PATH 環境変数、--file オプションで直接指定できます"
    )]
    StackFileNotFound,

    #[error("設定ファイルの形式が不正です ({path}): {message}")]
    InvalidSettings { path: String, message: String },

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
