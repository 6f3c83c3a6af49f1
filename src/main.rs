use anyhow::Result;
use actions_toolkit::cli::{App, Args};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse_args();
    let mut app = App::from_args(&args)?;

    let code = app.run(args).await?;
    std::process::exit(code);
}
