//! Structural merger (spec §4.4): combines a stable "base" pass list with
//! per-extension contributions into one ordered list, respecting per-pass
//! insert-point constraints.

use std::collections::{HashMap, HashSet};

use crate::error::{GraphError, Result};

/// A named anchor or one of the four sentinels a pass can order itself
/// relative to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Anchor {
    Named(String),
    Begin,
    AfterBase,
    End,
    FirstBase,
}

/// Per-pass ordering constraint against the merged list.
#[derive(Debug, Clone, Default)]
pub struct InsertPoint {
    pub priority: i32,
    pub keep_extension_order: bool,
    pub after: Vec<Anchor>,
    pub before: Vec<Anchor>,
}

#[derive(Debug, Clone)]
struct Contribution {
    name: String,
    extension: Option<String>,
    insert_point: InsertPoint,
    gather_order: usize,
}

/// Merges a stable "base" pass list (declared by the application) with
/// per-extension contributions.
#[derive(Default)]
pub struct StructuralMerger {
    base: Vec<String>,
    externals: Vec<Contribution>,
}

impl StructuralMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_base(&mut self, base: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.base = base.into_iter().map(Into::into).collect();
        self
    }

    pub fn add_external(
        &mut self,
        name: impl Into<String>,
        extension: Option<String>,
        insert_point: InsertPoint,
    ) -> &mut Self {
        let gather_order = self.externals.len();
        self.externals.push(Contribution {
            name: name.into(),
            extension,
            insert_point,
            gather_order,
        });
        self
    }

    /// Resolve the merged order, dropping sentinels.
    pub fn merge(&self) -> Result<Vec<String>> {
        const BEGIN: usize = 0;
        const AFTER_BASE: usize = 1;
        const END: usize = 2;
        let base_start = 3usize;

        let mut names: Vec<String> =
            Vec::with_capacity(3 + self.base.len() + self.externals.len());
        names.push("__rg_begin__".into());
        names.push("__rg_after_base__".into());
        names.push("__rg_end__".into());
        names.extend(self.base.iter().cloned());
        for ext in &self.externals {
            names.push(ext.name.clone());
        }

        let mut dup_check: HashSet<&str> = HashSet::new();
        for name in self.base.iter().chain(self.externals.iter().map(|e| &e.name)) {
            if !dup_check.insert(name.as_str()) {
                return Err(GraphError::DuplicatePassName(name.clone()));
            }
        }

        let n = names.len();
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut indegree = vec![0usize; n];
        let mut add_edge = |edges: &mut Vec<Vec<usize>>, indegree: &mut Vec<usize>, from: usize, to: usize| {
            edges[from].push(to);
            indegree[to] += 1;
        };

        // base chain: begin -> first_base -> ... -> last_base -> after_base
        if self.base.is_empty() {
            add_edge(&mut edges, &mut indegree, BEGIN, AFTER_BASE);
        } else {
            add_edge(&mut edges, &mut indegree, BEGIN, base_start);
            for i in 0..self.base.len().saturating_sub(1) {
                add_edge(&mut edges, &mut indegree, base_start + i, base_start + i + 1);
            }
            add_edge(
                &mut edges,
                &mut indegree,
                base_start + self.base.len() - 1,
                AFTER_BASE,
            );
        }

        let name_to_index: HashMap<&str, usize> =
            names.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();

        let resolve_anchor = |anchor: &Anchor| -> Option<usize> {
            match anchor {
                Anchor::Begin => Some(BEGIN),
                Anchor::AfterBase => Some(AFTER_BASE),
                Anchor::End => Some(END),
                Anchor::FirstBase => {
                    if self.base.is_empty() {
                        None
                    } else {
                        Some(base_start)
                    }
                }
                Anchor::Named(name) => name_to_index.get(name.as_str()).copied(),
            }
        };

        let ext_start = base_start + self.base.len();
        for (i, ext) in self.externals.iter().enumerate() {
            let self_idx = ext_start + i;
            add_edge(&mut edges, &mut indegree, AFTER_BASE, self_idx);
            add_edge(&mut edges, &mut indegree, self_idx, END);

            for anchor in &ext.insert_point.after {
                match resolve_anchor(anchor) {
                    Some(target) => add_edge(&mut edges, &mut indegree, target, self_idx),
                    None => tracing::warn!(anchor = ?anchor, "structural merge: missing anchor, ignoring"),
                }
            }
            for anchor in &ext.insert_point.before {
                match resolve_anchor(anchor) {
                    Some(target) => add_edge(&mut edges, &mut indegree, self_idx, target),
                    None => tracing::warn!(anchor = ?anchor, "structural merge: missing anchor, ignoring"),
                }
            }
        }

        // Per-extension chaining: consecutive externals from the same
        // extension with `keep_extension_order` get predecessor->successor.
        let mut last_by_extension: HashMap<&str, usize> = HashMap::new();
        for (i, ext) in self.externals.iter().enumerate() {
            let self_idx = ext_start + i;
            if let Some(ext_name) = &ext.extension {
                if ext.insert_point.keep_extension_order {
                    if let Some(&prev_idx) = last_by_extension.get(ext_name.as_str()) {
                        add_edge(&mut edges, &mut indegree, prev_idx, self_idx);
                    }
                }
                last_by_extension.insert(ext_name.as_str(), self_idx);
            }
        }

        // Topological sort, ties broken by (priority asc, gather order asc).
        let priority_of = |idx: usize| -> (i32, usize) {
            if idx < ext_start {
                (0, 0)
            } else {
                let ext = &self.externals[idx - ext_start];
                (ext.insert_point.priority, ext.gather_order)
            }
        };

        let mut ready: Vec<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while !ready.is_empty() {
            ready.sort_by_key(|&i| priority_of(i));
            let u = ready.remove(0);
            order.push(u);
            for &v in &edges[u] {
                indegree[v] -= 1;
                if indegree[v] == 0 {
                    ready.push(v);
                }
            }
        }

        if order.len() != n {
            return Err(GraphError::CyclicDependency);
        }

        Ok(order
            .into_iter()
            .filter(|&i| i != BEGIN && i != AFTER_BASE && i != END)
            .map(|i| names[i].clone())
            .collect())
    }
}
