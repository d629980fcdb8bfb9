//! # xtask - Автоматизация сборки проекта
//!
//! См. [`HELP_TEXT`] для списка доступных команд.

use anyhow::{Context, Result, bail};
use xshell::{Shell, cmd};

/// Текст справки, который выводит `cargo run -p xtask -- help`.
pub const HELP_TEXT: &str = r#"xtask

Использование:
  cargo run -p xtask -- <команда>

Команды:
  help         Показать это сообщение
  fmt          Запустить rustfmt
  fmt-check    Проверить форматирование (CI)
  clippy       Запустить clippy (воркспейс)
  test         Запустить тесты через nextest, затем доктесты
  test-pg      Запустить тесты хранилища PostgreSQL (нужен DATABASE_URL)
  ci           Запустить fmt-check + clippy + test (профиль CI)
  serve        Запустить quote-server с хранилищем в памяти

Примечание:
  cargo-nextest устанавливается автоматически при первом запуске тестов
"#;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let cmd = args.next().unwrap_or_else(|| "help".to_string());

    let sh = Shell::new()?;

    match cmd.as_str() {
        "help" | "-h" | "--help" => help(),
        "fmt" => Ok(cmd!(sh, "cargo +nightly fmt --all").run()?),
        "fmt-check" => Ok(cmd!(sh, "cargo +nightly fmt --all -- --check").run()?),
        "clippy" => Ok(cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?),
        "test" => test(&sh, None),
        "test-pg" => test_pg(&sh),
        "ci" => {
            cmd!(sh, "cargo +nightly fmt --all -- --check").run()?;
            cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?;
            test(&sh, Some("ci"))
        }
        "serve" => {
            let extra: Vec<String> = args.collect();
            Ok(cmd!(sh, "cargo run -p quote-server -- {extra...}").env("RUST_LOG", "info").run()?)
        }
        other => bail!("Unknown command: {other}\n\nRun: cargo run -p xtask -- help"),
    }
}

fn help() -> Result<()> {
    println!("{HELP_TEXT}");
    Ok(())
}

/// Модульные и интеграционные тесты через nextest; доктесты отдельно,
/// nextest их не запускает.
fn test(sh: &Shell, profile: Option<&str>) -> Result<()> {
    ensure_nextest(sh)?;
    match profile {
        Some(profile) => cmd!(sh, "cargo nextest run --workspace --profile {profile}").run()?,
        None => cmd!(sh, "cargo nextest run --workspace").run()?,
    }
    cmd!(sh, "cargo test --workspace --doc").run()?;
    Ok(())
}

/// Запускает `#[ignore]`-тесты, которым нужен настоящий PostgreSQL.
fn test_pg(sh: &Shell) -> Result<()> {
    let url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must point at a disposable PostgreSQL database")?;
    ensure_nextest(sh)?;
    cmd!(sh, "cargo nextest run -p quote-server --test postgres --run-ignored only")
        .env("DATABASE_URL", url)
        .run()?;
    Ok(())
}

fn ensure_nextest(sh: &Shell) -> Result<()> {
    if cmd!(sh, "cargo nextest --version").quiet().ignore_stdout().ignore_stderr().run().is_err() {
        eprintln!("Installing cargo-nextest...");
        cmd!(sh, "cargo install cargo-nextest --locked").run()?;
    }
    Ok(())
}
