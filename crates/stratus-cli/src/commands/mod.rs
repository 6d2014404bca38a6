pub mod archive;
pub mod retention;
pub mod scheduler;
pub mod terrain;
pub mod tiles;

/// Print a JSON summary to stdout, pretty and sorted for scripting.
pub fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
