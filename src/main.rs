//! Entry point for the ClimPrep application.
//! Parses the CLI arguments, loads the JSON job file and runs the
//! preprocessing pipeline for each requested variable. Per-variable
//! failures are caught and reported here so one bad variable doesn't stop
//! the rest of the job.

use clap::Parser;
use clim_prep::cli::{Args, JobSpec};
use clim_prep::convention::VariableTranslator;
use clim_prep::nco::NcoTools;
use clim_prep::parallel::ParallelConfig;
use clim_prep::pipeline::{MultiFilePreprocessor, PipelineConfig, SingleFilePreprocessor};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!(
        r#"
------------------------------------------------------------------
   ClimPrep - NetCDF preprocessing for climate diagnostics
------------------------------------------------------------------
"#
    );

    if let Some(threads) = args.threads {
        ParallelConfig::with_threads(threads).setup_global_pool()?;
    }
    if args.check_nco {
        NcoTools::check_environ()?;
    }

    let job = JobSpec::from_path(&args.job)?;
    let translator = VariableTranslator::with_builtin_tables();
    let config = PipelineConfig {
        convention: job.convention.clone(),
        frequency: job.frequency.clone(),
    };

    let mut failures = 0usize;
    for entry in &job.variables {
        let result = entry
            .to_var_spec(&translator, &job.convention, &job.frequency)
            .and_then(|var| {
                if args.chunked || var.needs_chunked_strategy() {
                    MultiFilePreprocessor::new(&config, &translator, var)?.preprocess()
                } else {
                    SingleFilePreprocessor::new(&config, &translator, var)?.preprocess()
                }
            });
        if let Err(e) = result {
            eprintln!("✗ Preprocessing failed for '{}': {}", entry.name, e);
            failures += 1;
        }
    }

    println!(
        "Done: {} of {} variable(s) preprocessed",
        job.variables.len() - failures,
        job.variables.len()
    );
    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
