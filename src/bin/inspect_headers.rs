use pointtab::{read_headers, LoaderConfig};
use std::env;

/// Print the header row of a CSV as a YAML list, the way the host lists
/// selectable labels before plotting.
fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <file.csv>", args[0]);
        std::process::exit(1);
    }

    let headers = read_headers(&args[1], &LoaderConfig::default())?;
    print!("{}", serde_yaml::to_string(&headers)?);
    Ok(())
}
