//! Phi construction and trivial-phi elimination
//!
//! A phi holds one edge per predecessor slot, mirrored index-for-index
//! with its block's predecessor list. Edges are filled by reading the
//! variable at the end of each predecessor, which may recurse into
//! further phi creation; the phi is recorded as the variable's definition
//! before filling starts so loop back-edges terminate by hitting the
//! symbol table instead of recursing forever.
//!
//! After filling, the edge set is scanned ignoring self-references and
//! `None` edges:
//! - two or more distinct survivors: the phi is genuine and is installed
//!   onto the block's phi list
//! - exactly one: the phi is redundant; every user is rewritten to the
//!   survivor and every phi among the former users is re-checked, since
//!   removing a phi can make another one trivial (the cascade)
//! - zero: unreachable block or function entry; the phi resolves to no
//!   value and is never installed

use tracing::trace;

use crate::features::ssa::domain::{BlockId, Node, NodeKind, ValueId};

use super::builder::ProgramBuilder;

impl ProgramBuilder<'_> {
    /// Allocate an empty phi bound to `block`. Not yet an installed
    /// instruction: it only enters the block's phi list if it survives
    /// minimization.
    pub(crate) fn new_phi(&mut self, block: BlockId, variable: &str) -> ValueId {
        let func = self.program.block(block).func;
        let mut node = Node::new(NodeKind::Phi { edges: Vec::new() });
        node.func = Some(func);
        node.block = Some(block);
        node.variable = Some(variable.to_string());
        self.stats.phis_created += 1;
        self.program.nodes.alloc(node)
    }

    /// Fill the phi's edges from the (now final) predecessor list, then
    /// minimize. Returns the value the read resolves to: the phi itself,
    /// its single surviving operand, or nothing.
    pub(crate) fn build_phi(&mut self, phi: ValueId) -> Option<ValueId> {
        let (block, variable) = {
            let node = self.program.nodes.get(phi)?;
            (node.block?, node.variable.clone()?)
        };
        let preds = self.program.block(block).preds.clone();

        let mut edges: Vec<Option<ValueId>> = Vec::with_capacity(preds.len());
        for pred in preds {
            edges.push(self.read_variable_by_block(&variable, pred));
        }
        for edge in edges.iter().flatten() {
            self.program.nodes.add_user(*edge, phi);
        }
        if let Some(node) = self.program.nodes.get_mut(phi) {
            node.kind = NodeKind::Phi { edges };
        }
        self.try_remove_trivial_phi(phi)
    }

    /// The triviality check and (when trivial) the cascading removal
    pub(crate) fn try_remove_trivial_phi(&mut self, phi: ValueId) -> Option<ValueId> {
        let (block, edges) = {
            let node = self.program.nodes.get(phi)?;
            let NodeKind::Phi { edges } = &node.kind else {
                return Some(phi);
            };
            (node.block?, edges.clone())
        };

        let mut same: Option<ValueId> = None;
        for edge in edges.iter().flatten() {
            // skip self-references and the tentative survivor
            if *edge == phi || Some(*edge) == same {
                continue;
            }
            if same.is_some() {
                // two distinct operands: the merge is genuine
                let b = self.program.block_mut(block);
                if !b.phis.contains(&phi) {
                    b.phis.push(phi);
                }
                return Some(phi);
            }
            same = Some(*edge);
        }

        match same {
            Some(survivor) => {
                trace!(phi = %phi, survivor = %survivor, "trivial phi removed");
                self.expunge_phi(phi, block, Some(survivor));
                Some(survivor)
            }
            None => {
                // unreachable block or entry: the read has no value
                trace!(phi = %phi, "phi with no operands dropped");
                self.expunge_phi(phi, block, None);
                None
            }
        }
    }

    /// Remove a phi from the graph, substituting `replacement` (or a fresh
    /// `Undefined` leaf when the phi reduced to nothing but is already
    /// referenced), then cascade into phi users.
    fn expunge_phi(&mut self, phi: ValueId, block: BlockId, replacement: Option<ValueId>) {
        let users_before: Vec<ValueId> = self
            .program
            .nodes
            .users(phi)
            .iter()
            .copied()
            .filter(|&u| u != phi)
            .collect();
        let referenced = !users_before.is_empty() || self.symbol_references(phi);

        let target = match replacement {
            Some(v) => Some(v),
            None if referenced => {
                // keep downstream readers total: substitute an explicit
                // undefined leaf at the head of the block
                let func = self.program.block(block).func;
                let variable = self
                    .program
                    .nodes
                    .get(phi)
                    .and_then(|n| n.variable.clone());
                let mut node = Node::new(NodeKind::Undefined);
                node.func = Some(func);
                node.block = Some(block);
                node.variable = variable;
                let undef = self.program.nodes.alloc(node);
                self.program.block_mut(block).insts.insert(0, undef);
                Some(undef)
            }
            None => None,
        };

        if let Some(target) = target {
            self.program.nodes.replace_all_uses(phi, target);
            self.rewrite_symbol_references(phi, target);
        } else {
            self.drop_symbol_references(phi);
        }

        let b = self.program.block_mut(block);
        b.phis.retain(|&p| p != phi);
        b.incomplete_phis.retain(|&p| p != phi);
        self.program.nodes.remove(phi);
        self.stats.trivial_phis_removed += 1;

        // removing a phi can make a phi that read it trivial too
        for user in users_before {
            if self
                .program
                .nodes
                .get(user)
                .map(|n| n.is_phi())
                .unwrap_or(false)
            {
                self.try_remove_trivial_phi(user);
            }
        }
    }

    fn symbol_references(&self, value: ValueId) -> bool {
        let Some(func) = self.program.nodes.get(value).and_then(|n| n.func) else {
            return false;
        };
        self.program
            .func(func)
            .symbol_table
            .values()
            .any(|history| history.iter().any(|(_, def)| *def == value))
    }

    /// Builder state must not dangle: symbol-table histories naming the
    /// removed phi now name its replacement.
    fn rewrite_symbol_references(&mut self, old: ValueId, new: ValueId) {
        let Some(func) = self.program.nodes.get(old).and_then(|n| n.func) else {
            return;
        };
        for history in self.program.func_mut(func).symbol_table.values_mut() {
            for (_, def) in history.iter_mut() {
                if *def == old {
                    *def = new;
                }
            }
        }
    }

    fn drop_symbol_references(&mut self, old: ValueId) {
        let Some(func) = self.program.nodes.get(old).and_then(|n| n.func) else {
            return;
        };
        for history in self.program.func_mut(func).symbol_table.values_mut() {
            history.retain(|(_, def)| *def != old);
        }
    }
}
