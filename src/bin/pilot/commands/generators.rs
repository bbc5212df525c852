//! `pilot generators` command

use anyhow::Result;

use pilot::generator::is_multi_config;
use pilot::GeneratorSelector;

use crate::cli::GeneratorsArgs;

pub fn execute(args: GeneratorsArgs) -> Result<()> {
    let selector = GeneratorSelector::builtin();
    let mut shown = 0;

    for (platform, compiler, candidates) in selector.entries() {
        if args.platform.is_some_and(|p| p != platform) {
            continue;
        }
        if args.compiler.is_some_and(|c| c != compiler) {
            continue;
        }

        let default = selector.select(platform, compiler, false)?;
        let multi = selector.select(platform, compiler, true)?;

        println!("{}/{}", platform, compiler);
        println!("  default:      {}", default);
        println!("  multi-config: {}", multi);
        for candidate in candidates {
            let marker = if is_multi_config(candidate) { " (multi-config)" } else { "" };
            println!("    - {}{}", candidate, marker);
        }
        shown += 1;
    }

    if shown == 0 {
        println!("No supported combinations match the given filters");
    }

    Ok(())
}
