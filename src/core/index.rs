//! Filepath: src/core/index.rs
//! Strategy dispatch for symbol indexing.
//!
//! The fallback order is data (`StrategyChain`), not control flow:
//! each strategy is tried in turn, failures are recorded, and the
//! heuristic scanner always closes the chain.

use serde::Serialize;
use tracing::{instrument, trace, warn};

use crate::{
    core::{
        error::ExtractionError,
        symbols::{Language, Strategy, Symbol, SymbolExtractor, SymbolNester},
    },
    parsers::{grammar::GrammarExtractor, heuristic::HeuristicExtractor, syntax_tree::SyntaxTreeExtractor},
};

/// Ordered strategies to try; the heuristic scanner is always last
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyChain {
    order: Vec<Strategy>,
}

impl StrategyChain {
    /// `preferred`, then `fallback` in order, then the heuristic scanner.
    /// Duplicates are dropped and nothing runs after the heuristic.
    pub fn new(preferred: Strategy, fallback: &[Strategy]) -> Self {
        let mut order: Vec<Strategy> = Vec::with_capacity(fallback.len() + 2);
        for s in std::iter::once(preferred).chain(fallback.iter().copied()) {
            if order.contains(&s) {
                continue;
            }
            order.push(s);
            if s == Strategy::Heuristic {
                break;
            }
        }
        if order.last() != Some(&Strategy::Heuristic) {
            order.push(Strategy::Heuristic);
        }
        Self { order }
    }

    pub fn preferred(strategy: Strategy) -> Self {
        Self::new(strategy, &[])
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.order
    }

    pub fn first(&self) -> Strategy {
        self.order.first().copied().unwrap_or(Strategy::Heuristic)
    }
}

impl Default for StrategyChain {
    fn default() -> Self {
        Self::preferred(Strategy::Grammar)
    }
}

/// Outcome of indexing one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexResult {
    pub language: Language,
    pub symbols: Vec<Symbol>,
    /// Strategy that produced `symbols`
    pub strategy: Strategy,
    /// A later strategy in the chain had to be used
    pub degraded: bool,
    /// Why earlier strategies were skipped
    pub failures: Vec<ExtractionError>,
}

/// Runs a `StrategyChain` over the available extractors
#[derive(Debug, Default)]
pub struct SymbolIndexer {
    chain: StrategyChain,
    grammar: GrammarExtractor,
    syntax_tree: SyntaxTreeExtractor,
    heuristic: HeuristicExtractor,
}

impl SymbolIndexer {
    pub fn new(chain: StrategyChain) -> Self {
        Self {
            chain,
            ..Self::default()
        }
    }

    pub fn chain(&self) -> &StrategyChain {
        &self.chain
    }

    fn extractor(&self, strategy: Strategy) -> &dyn SymbolExtractor {
        match strategy {
            Strategy::Grammar => &self.grammar,
            Strategy::SyntaxTree => &self.syntax_tree,
            Strategy::Heuristic => &self.heuristic,
        }
    }

    /// Index `content`, degrading along the chain on failure
    #[instrument(level = "debug", skip(self, content), fields(bytes = content.len()))]
    pub fn index(&self, content: &str, language: Language) -> IndexResult {
        let first = self.chain.first();
        let mut failures = Vec::new();

        for &strategy in self.chain.strategies() {
            let extractor = self.extractor(strategy);
            let attempt = if extractor.supports(language) {
                extractor.extract(content, language)
            } else {
                Err(ExtractionError::Unsupported { strategy, language })
            };

            match attempt {
                Ok(raw) => {
                    let degraded = strategy != first;
                    if degraded {
                        warn!(%strategy, %language, skipped = failures.len(), "symbol indexing degraded");
                    }
                    trace!(%strategy, symbols = raw.len(), "strategy succeeded");
                    return IndexResult {
                        language,
                        symbols: SymbolNester::nest(content, raw),
                        strategy,
                        degraded,
                        failures,
                    };
                }
                Err(e) => {
                    trace!(%strategy, error = %e, "strategy failed");
                    failures.push(e);
                }
            }
        }

        // Only reachable if the heuristic scanner itself refused
        warn!(%language, "all indexing strategies failed");
        IndexResult {
            language,
            symbols: Vec::new(),
            strategy: Strategy::Heuristic,
            degraded: first != Strategy::Heuristic,
            failures,
        }
    }
}
