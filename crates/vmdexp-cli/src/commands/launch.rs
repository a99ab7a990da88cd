use crate::cli::LaunchArgs;
use crate::config::{BackendConfig, PartialLaunchConfig};
use crate::error::Result;
use crate::launch::local::LocalBackend;
use crate::launch::lsf::LsfBackend;
use crate::launch::runner::SystemRunner;
use crate::launch::slurm::{SlurmBackend, expand_slots};
use crate::launch::{Backend, SubmissionHandle};
use tracing::{info, warn};
use vmdexp::workflows::manifest::SessionManifest;

pub async fn run(args: LaunchArgs) -> Result<()> {
    let manifest = SessionManifest::load(&args.session)?;
    info!(
        session = %manifest.name,
        sets = manifest.simulation_sets.len(),
        "Session manifest loaded."
    );

    let partial = match &args.config {
        Some(path) => PartialLaunchConfig::from_file(path)?,
        None => PartialLaunchConfig::default(),
    };
    let config = partial.merge_with_cli(&args, std::env::var("USER").ok())?;
    let sets = &manifest.simulation_sets;

    let handles = match config.backend {
        BackendConfig::Local { gpus } => {
            println!("Running {} set(s) locally on {} GPU(s)...", sets.len(), gpus.len());
            LocalBackend::new(&config.engine, gpus).submit(sets).await?
        }
        BackendConfig::Lsf {
            nodes,
            queue,
            scratch_root,
            user,
        } => {
            println!("Submitting {} set(s) with bsub...", sets.len());
            LsfBackend {
                runner: SystemRunner,
                engine: config.engine,
                session: manifest.name.clone(),
                nodes,
                queue,
                scratch_root,
                user,
                post_script: config.post_script,
                interval: config.submit_interval,
            }
            .submit(sets)
            .await?
        }
        BackendConfig::Slurm {
            partitions,
            nodes,
            fillings,
            modules,
            gres,
        } => {
            println!("Submitting {} set(s) with sbatch...", sets.len());
            SlurmBackend {
                runner: SystemRunner,
                engine: config.engine,
                slots: expand_slots(&partitions, &nodes, &fillings)?,
                modules,
                gres,
                post_script: config.post_script,
                interval: config.submit_interval,
            }
            .submit(sets)
            .await?
        }
    };

    report(&handles);
    Ok(())
}

fn report(handles: &[SubmissionHandle]) {
    for handle in handles {
        match handle.exit_code {
            Some(0) | None => println!("  {} -> {} [{}]", handle.set, handle.target, handle.id),
            Some(code) => {
                warn!(set = %handle.set, code, "Engine run failed.");
                println!("  {} -> {} [{}] exited with {}", handle.set, handle.target, handle.id, code);
            }
        }
    }
}
