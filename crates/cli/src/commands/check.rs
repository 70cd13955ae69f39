//! `ctxweave check`: validate the configuration and show what it seeds.

use ctxweave_config::ContextConfig;
use ctxweave_core::provider::Provider as _;
use ctxweave_core::state::BucketKind;
use std::path::Path;

pub async fn run(config_path: &Path, print_default: bool, ping: bool) -> anyhow::Result<()> {
    if print_default {
        print!("{}", ContextConfig::default_toml());
        return Ok(());
    }

    println!("ctxweave check: {}", config_path.display());
    println!("========================================\n");

    let config = match ContextConfig::load_with_env(config_path) {
        Ok(config) => {
            println!("  ok    Config file valid");
            config
        }
        Err(e) => {
            println!("  FAIL  {e}");
            anyhow::bail!("configuration is not usable");
        }
    };

    let mut issues = 0;

    if config.has_api_key() || config.llm.provider == "ollama" {
        println!("  ok    Backend: {} ({})", config.llm.provider, config.llm.model);
    } else {
        println!("  warn  No API key for {}, set CTXWEAVE_API_KEY", config.llm.provider);
        issues += 1;
    }

    if ping {
        match ctxweave_providers::build_from_config(&config.llm) {
            Ok(provider) => match provider.health_check().await {
                Ok(true) => println!("  ok    Backend reachable at {}", provider.base_url()),
                Ok(false) => {
                    println!("  warn  Backend at {} answered with an error", provider.base_url());
                    issues += 1;
                }
                Err(e) => {
                    println!("  warn  Backend unreachable: {e}");
                    issues += 1;
                }
            },
            Err(e) => {
                println!("  warn  {e}");
                issues += 1;
            }
        }
    }

    for path in config.files() {
        if Path::new(&path).is_file() {
            println!("  ok    Knowledge file: {path}");
        } else {
            println!("  warn  Knowledge file missing: {path}");
            issues += 1;
        }
    }
    for path in config.dirs() {
        if Path::new(&path).is_dir() {
            println!("  ok    Knowledge directory: {path}");
        } else {
            println!("  warn  Knowledge directory missing: {path}");
            issues += 1;
        }
    }

    let seed = config.seed();
    println!();
    println!("  System:     {}", seed.system.as_deref().unwrap_or("(none)"));
    println!("  Sticky:     {} item(s)", config.sticky().len());
    for kind in BucketKind::ALL {
        println!("  {:<11} {} item(s)", format!("{}:", kind.title()), seed.bucket(kind).len());
    }
    println!("  Priority:   {}", seed.priority.join(", "));
    if seed.procedure_enabled {
        println!("  Procedure:  {} step(s)", seed.procedure_steps.len());
    } else {
        println!("  Procedure:  disabled");
    }
    println!("  Max rounds: {}", match config.engine.round_limit() {
        Some(n) => n.to_string(),
        None => "unbounded".into(),
    });
    println!("  Checkpoint: {:?}", config.checkpoint.backend);

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
