//! `corral ps`: List containers.

use corral_runtime::engine::Engine;

use crate::output;

const HEADERS: [&str; 6] = ["ID", "NAME", "PID", "STATUS", "COMMAND", "CREATED"];

/// Executes the `ps` command.
///
/// # Errors
///
/// Returns an error if the container records cannot be listed.
pub fn execute(engine: &Engine) -> anyhow::Result<()> {
    let rows: Vec<Vec<String>> = engine
        .list()?
        .into_iter()
        .map(|c| {
            vec![
                c.id.to_string(),
                c.name,
                c.pid.map_or_else(String::new, |p| p.to_string()),
                c.status.to_string(),
                c.command,
                c.create_time,
            ]
        })
        .collect();
    print!("{}", output::table(&HEADERS, &rows));
    Ok(())
}
