use super::super::args::*;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Run(args) => super::run::run(args).await,
        Command::Report(args) => super::report::run(args),
        Command::Backbones => super::backbones::run(),
        Command::Worker => super::worker::run(),
    }
}
