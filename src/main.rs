use anyhow::Result;
use log::info;
use spectrace::logging;
use spectrace::problem::Problem;
use spectrace::settings;

fn main() -> Result<()> {
    let settings = settings::load_config()?;
    logging::install(settings.verbose)?;
    info!("{}", settings);

    let mut problem = Problem::from_settings(settings)?;
    problem.solve()?;
    problem.writeup()?;
    Ok(())
}
