//! Compiling many rule files at once.
//!
//! Each source compiles independently; one failure does not stop the others.
//! Results always come back in input order.

use crate::compiler::Compiler;
use crate::config::{BatchConfig, CompileOptions};
use crate::error::{CompileError, Result, RulesError};
use crate::ir::CompiledRules;
use rayon::prelude::*;

/// Outcome for one named source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub name: String,
    pub result: std::result::Result<CompiledRules, CompileError>,
}

impl BatchItem {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Compile `(name, source)` pairs.
///
/// Batches smaller than [`BatchConfig::min_batch_size_for_parallelism`], or
/// any batch when parallelism is disabled, run on the calling thread.
///
/// # Examples
///
/// ```rust
/// use config_rules::batch::compile_batch;
/// use config_rules::config::{BatchConfig, CompileOptions};
///
/// let sources = vec![
///     ("a.txt".to_string(), "// version:1\nset:(X=\"1\")\n".to_string()),
///     ("b.txt".to_string(), "set:(X=\"1\")\n".to_string()),
/// ];
/// let items = compile_batch(&sources, &CompileOptions::default(), &BatchConfig::default())?;
/// assert!(items[0].is_ok());
/// assert!(!items[1].is_ok());
/// # Ok::<(), config_rules::RulesError>(())
/// ```
pub fn compile_batch(
    sources: &[(String, String)],
    options: &CompileOptions,
    config: &BatchConfig,
) -> Result<Vec<BatchItem>> {
    let compiler = Compiler::with_options(options.clone());
    let compile_one = |(name, source): &(String, String)| BatchItem {
        name: name.clone(),
        result: compiler.compile(source),
    };

    if !config.enable_parallelism || sources.len() < config.min_batch_size_for_parallelism {
        log::debug!("compiling {} sources sequentially", sources.len());
        return Ok(sources.iter().map(compile_one).collect());
    }

    match config.num_threads {
        Some(threads) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| RulesError::Config(format!("Failed to build thread pool: {}", e)))?;
            log::debug!("compiling {} sources on {} threads", sources.len(), threads);
            Ok(pool.install(|| sources.par_iter().map(compile_one).collect()))
        }
        None => {
            log::debug!(
                "compiling {} sources on {} threads",
                sources.len(),
                rayon::current_num_threads()
            );
            Ok(sources.par_iter().map(compile_one).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(count: usize) -> Vec<(String, String)> {
        (0..count)
            .map(|i| {
                let body = if i % 3 == 2 {
                    "// version:1\nendif\n".to_string()
                } else {
                    format!("// version:{}\nset:(Index=\"{}\")\n", i + 1, i)
                };
                (format!("rules_{i}.txt"), body)
            })
            .collect()
    }

    fn check(items: &[BatchItem]) {
        for (i, item) in items.iter().enumerate() {
            assert_eq!(item.name, format!("rules_{i}.txt"));
            if i % 3 == 2 {
                assert_eq!(item.result.as_ref().unwrap_err().line, 2);
            } else {
                assert_eq!(item.result.as_ref().unwrap().rule_version, i as u16 + 1);
            }
        }
    }

    #[test]
    fn test_sequential_preserves_order() {
        let config = BatchConfig {
            enable_parallelism: false,
            ..Default::default()
        };
        let items = compile_batch(&sources(7), &CompileOptions::default(), &config).unwrap();
        assert_eq!(items.len(), 7);
        check(&items);
    }

    #[test]
    fn test_parallel_preserves_order() {
        let config = BatchConfig {
            num_threads: Some(3),
            enable_parallelism: true,
            min_batch_size_for_parallelism: 2,
        };
        let items = compile_batch(&sources(40), &CompileOptions::default(), &config).unwrap();
        assert_eq!(items.len(), 40);
        check(&items);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let input = sources(12);
        let sequential = compile_batch(
            &input,
            &CompileOptions::default(),
            &BatchConfig {
                enable_parallelism: false,
                ..Default::default()
            },
        )
        .unwrap();
        let parallel =
            compile_batch(&input, &CompileOptions::default(), &BatchConfig::default()).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_empty_batch() {
        let items = compile_batch(&[], &CompileOptions::default(), &BatchConfig::default()).unwrap();
        assert!(items.is_empty());
    }
}
