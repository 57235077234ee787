use anyhow::Context;

fn main() -> anyhow::Result<()> {
  let args: Vec<String> = std::env::args().collect();

  if args.iter().any(|a| a == "--version") {
    println!("{}", env!("CARGO_PKG_VERSION"));
    return Ok(());
  }

  let opts = forum_sweep::SweepOptions::from_args(&args);
  forum_sweep::run(opts).context("forum sweep")?;
  Ok(())
}
