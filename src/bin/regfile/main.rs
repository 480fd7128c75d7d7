use anyhow::Result;
use env_logger::{Builder, Env};

mod cli;
mod util;
mod cmd_register;
mod cmd_check;
mod cmd_import;
mod cmd_setdata;
mod cmd_query;
mod cmd_recover;
mod cmd_defaults;

fn main() {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Register { files, group, comment, defaults, commit } =>
            cmd_register::exec(cli.config, files, group, comment, defaults, commit),

        cli::Cmd::Check { files } =>
            cmd_check::exec(cli.config, files),

        cli::Cmd::Import { files, group, comment, defaults, commit } =>
            cmd_import::exec(cli.config, files, group, comment, defaults, commit),

        cli::Cmd::Setdata { id, name, group, comment, all } =>
            cmd_setdata::exec(cli.config, id, name, group, comment, all),

        cli::Cmd::Query { id, name, group, comment, verbose, mysum, ed2k } =>
            cmd_query::exec(cli.config, id, name, group, comment, verbose, mysum, ed2k),

        cli::Cmd::Recover {} =>
            cmd_recover::exec(cli.config),

        cli::Cmd::Defaults { dir, group, comment } =>
            cmd_defaults::exec(dir, group, comment),
    }
}
