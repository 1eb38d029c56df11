//! Incremental SSA construction
//!
//! On-the-fly SSA in the style of Braun et al. ("Simple and Efficient
//! Construction of SSA Form", 2013): no dominator tree, phis are inserted
//! on demand while the CFG is still being assembled. The statement driver
//! emits one instruction per call; variable reads resolve through the
//! per-function symbol table:
//!
//! - local definition in the current block → use it
//! - sealed block, one predecessor → recurse into the predecessor
//! - sealed block, several predecessors → incomplete phi, recorded as the
//!   variable's definition *before* its edges are filled (terminates loop
//!   recursion), then minimized
//! - unsealed block → incomplete phi queued until the block seals
//! - nothing anywhere → `Undefined` instruction carrying a diagnostic
//!
//! The builder is a sequential state machine; all per-build caches (type
//! store, literal cache, host bridges) live on it, never in globals, so
//! independent program builds cannot cross-talk.

use ahash::AHashMap;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::features::ssa::domain::{
    BinaryOp, BlockId, ConstValue, FuncId, Node, NodeKind, PackageId, Program, SwitchLabel,
    UnaryOp, ValueId,
};
use crate::features::ssa::ports::HostEnv;
use crate::features::type_system::{TypeId, TypeStore};
use crate::shared::models::{Diagnostic, DiagnosticTag, Span};

/// Construction statistics, mostly for logging and tests
#[derive(Debug, Default, Clone)]
pub struct BuilderStats {
    pub phis_created: usize,
    pub trivial_phis_removed: usize,
    pub undefined_reads: usize,
    pub const_cache_hits: usize,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame {
    pub func: FuncId,
    pub block: BlockId,
}

/// The stateful SSA builder. Created by `Program::build`, driven
/// synchronously by the statement driver.
pub struct ProgramBuilder<'p> {
    pub(crate) program: &'p mut Program,
    pub types: TypeStore,
    pub(crate) host: HostEnv,
    /// external identifier → canonical IR value, one per build
    pub(crate) extern_values: FxHashMap<String, ValueId>,
    /// canonical host type name → derived type, one per build
    pub(crate) extern_types: FxHashMap<String, TypeId>,
    const_cache: AHashMap<String, ValueId>,
    /// Share identical literals; disable to give every literal its own
    /// node
    pub share_consts: bool,
    frames: Vec<Frame>,
    current_package: Option<PackageId>,
    current_span: Option<Span>,
    pub(crate) stats: BuilderStats,
}

impl Program {
    /// Run one construction pass. The guard makes a second call on the
    /// same program an idempotent no-op.
    pub fn build<F>(&mut self, host: HostEnv, f: F)
    where
        F: FnOnce(&mut ProgramBuilder),
    {
        if !self.mark_built() {
            debug!("program already built; ignoring repeated build");
            return;
        }
        let mut builder = ProgramBuilder::new(self, host);
        f(&mut builder);
        builder.finish();
    }
}

impl<'p> ProgramBuilder<'p> {
    pub(crate) fn new(program: &'p mut Program, host: HostEnv) -> Self {
        Self {
            program,
            types: TypeStore::new(),
            host,
            extern_values: FxHashMap::default(),
            extern_types: FxHashMap::default(),
            const_cache: AHashMap::new(),
            share_consts: true,
            frames: Vec::new(),
            current_package: None,
            current_span: None,
            stats: BuilderStats::default(),
        }
    }

    pub fn stats(&self) -> &BuilderStats {
        &self.stats
    }

    pub fn program(&self) -> &Program {
        self.program
    }

    // ------------------------------------------------------------------
    // scope management
    // ------------------------------------------------------------------

    pub fn enter_package(&mut self, name: impl Into<String>) -> PackageId {
        let id = self.program.new_package(name);
        self.current_package = Some(id);
        id
    }

    /// Open a function and make its entry block current. When another
    /// function is already open, the new one is anonymous and keeps a
    /// parent back-reference for free-value resolution.
    pub fn enter_function(&mut self, name: impl Into<String>) -> FuncId {
        let package = match self.current_package {
            Some(p) => p,
            None => self.enter_package("main"),
        };
        let parent = self.frames.last().map(|f| f.func);
        let func = self.program.new_function(package, name, parent);
        let enter = self.program.func(func).enter;
        self.frames.push(Frame { func, block: enter });
        debug!(func = self.program.func(func).name.as_str(), "function opened");
        func
    }

    /// Close the innermost open function. All still-unsealed blocks are
    /// sealed here: the function's CFG is complete, so no block can gain
    /// further predecessors.
    pub fn exit_function(&mut self) {
        let frame = match self.frames.pop() {
            Some(f) => f,
            None => return,
        };
        let blocks = self.program.func(frame.func).blocks.clone();
        for block in blocks {
            self.seal_block(block);
        }
        debug!(
            func = self.program.func(frame.func).name.as_str(),
            "function closed"
        );
    }

    /// The innermost open frame, auto-opening `main`/`main` so that a
    /// driver can start emitting without boilerplate.
    pub(crate) fn frame(&mut self) -> Frame {
        if self.frames.is_empty() {
            self.enter_function("main");
        }
        // SAFETY: enter_function pushed a frame above
        *self.frames.last().expect("frames is non-empty")
    }

    pub fn current_function(&mut self) -> FuncId {
        self.frame().func
    }

    pub fn current_block(&mut self) -> BlockId {
        self.frame().block
    }

    pub fn set_current_block(&mut self, block: BlockId) {
        if let Some(frame) = self.frames.last_mut() {
            frame.block = block;
        }
    }

    pub fn new_block(&mut self, name: impl Into<String>) -> BlockId {
        let func = self.frame().func;
        self.program.new_block(func, name)
    }

    pub fn set_span(&mut self, span: Option<Span>) {
        self.current_span = span;
    }

    pub fn current_span(&self) -> Option<Span> {
        self.current_span
    }

    pub fn set_param_types(&mut self, types: Vec<TypeId>) {
        let func = self.frame().func;
        self.program.func_mut(func).param_types = types;
    }

    pub fn set_return_types(&mut self, types: Vec<TypeId>) {
        let func = self.frame().func;
        self.program.func_mut(func).return_types = types;
    }

    pub fn set_ellipsis(&mut self, ellipsis: bool) {
        let func = self.frame().func;
        self.program.func_mut(func).has_ellipsis = ellipsis;
    }

    // ------------------------------------------------------------------
    // node emission
    // ------------------------------------------------------------------

    /// Allocate a node bound to the current function/block/span, wire its
    /// operand user edges, and append it to the block's instruction list.
    pub(crate) fn emit_node(&mut self, mut node: Node) -> ValueId {
        let frame = self.frame();
        node.func = Some(frame.func);
        node.block = Some(frame.block);
        if node.span.is_none() {
            node.span = self.current_span;
        }
        let operands = node.operands();
        let id = self.program.nodes.alloc(node);
        for op in operands {
            self.program.nodes.add_user(op, id);
        }
        self.program.block_mut(frame.block).insts.push(id);
        id
    }

    /// Allocate a value that is not an instruction in a block (parameters,
    /// function references).
    pub(crate) fn alloc_value(&mut self, mut node: Node, func: Option<FuncId>) -> ValueId {
        node.func = func;
        if node.span.is_none() {
            node.span = self.current_span;
        }
        let operands = node.operands();
        let id = self.program.nodes.alloc(node);
        for op in operands {
            self.program.nodes.add_user(op, id);
        }
        id
    }

    fn mark_finished(&mut self) {
        let frame = self.frame();
        let block = self.program.block_mut(frame.block);
        if block.finished {
            trace!(block = block.name.as_str(), "terminator after terminator");
        }
        block.finished = true;
    }

    /// Literal, shared through the per-builder cache when enabled
    pub fn emit_const(&mut self, value: ConstValue) -> ValueId {
        let key = value.cache_key();
        if self.share_consts {
            if let Some(&cached) = self.const_cache.get(&key) {
                if self.program.nodes.contains(cached) {
                    self.stats.const_cache_hits += 1;
                    return cached;
                }
            }
        }
        let ty = match &value {
            ConstValue::Nil => self.types.nil(),
            ConstValue::Bool(_) => self.types.boolean(),
            ConstValue::Int(_) | ConstValue::Float(_) => self.types.number(),
            ConstValue::Str(_) => self.types.string(),
            ConstValue::Func(_) => self.types.any(),
        };
        let mut node = Node::new(NodeKind::Const { value });
        node.types = vec![ty];
        let id = self.emit_node(node);
        if self.share_consts {
            self.const_cache.insert(key, id);
        }
        id
    }

    pub fn emit_binop(&mut self, op: BinaryOp, x: ValueId, y: ValueId) -> ValueId {
        let mut node = Node::new(NodeKind::BinOp { op, x, y });
        if matches!(
            op,
            BinaryOp::Gt | BinaryOp::Lt | BinaryOp::GtEq | BinaryOp::LtEq | BinaryOp::Eq | BinaryOp::NotEq
        ) {
            node.types = vec![self.types.boolean()];
        }
        self.emit_node(node)
    }

    pub fn emit_unop(&mut self, op: UnaryOp, x: ValueId) -> ValueId {
        let mut node = Node::new(NodeKind::UnOp { op, x });
        if op == UnaryOp::Not {
            node.types = vec![self.types.boolean()];
        }
        self.emit_node(node)
    }

    /// Transfer control to the sole successor of the current block
    pub fn emit_jump(&mut self, to: BlockId) -> ValueId {
        let frame = self.frame();
        self.program.add_edge(frame.block, to);
        let id = self.emit_node(Node::new(NodeKind::Jump { to }));
        self.mark_finished();
        id
    }

    /// Two-way branch; wires both successor edges
    pub fn emit_if(&mut self, cond: ValueId, then_block: BlockId, else_block: BlockId) -> ValueId {
        let frame = self.frame();
        self.program.add_edge(frame.block, then_block);
        self.program.add_edge(frame.block, else_block);
        let id = self.emit_node(Node::new(NodeKind::If {
            cond,
            then_block,
            else_block,
        }));
        self.mark_finished();
        id
    }

    pub fn emit_return(&mut self, results: Vec<ValueId>) -> ValueId {
        let id = self.emit_node(Node::new(NodeKind::Return { results }));
        let frame = self.frame();
        self.program.func_mut(frame.func).returns.push(id);
        self.mark_finished();
        id
    }

    pub fn emit_switch(
        &mut self,
        cond: ValueId,
        default: BlockId,
        labels: Vec<SwitchLabel>,
    ) -> ValueId {
        let frame = self.frame();
        self.program.add_edge(frame.block, default);
        for label in &labels {
            self.program.add_edge(frame.block, label.dest);
        }
        let id = self.emit_node(Node::new(NodeKind::Switch {
            cond,
            default,
            labels,
        }));
        self.mark_finished();
        id
    }

    /// Function parameter: a leaf value, not a block instruction
    pub fn emit_parameter(&mut self, name: impl Into<String>) -> ValueId {
        let name = name.into();
        let frame = self.frame();
        let mut node = Node::new(NodeKind::Parameter {
            is_free_value: false,
        });
        node.variable = Some(name.clone());
        let id = self.alloc_value(node, Some(frame.func));
        self.program.func_mut(frame.func).params.push(id);
        self.write_variable(name, id);
        id
    }

    /// A function used as a value (call target or closure)
    pub fn function_ref(&mut self, func: FuncId) -> ValueId {
        let frame = self.frame();
        self.alloc_value(Node::new(NodeKind::FunctionRef { func }), Some(frame.func))
    }

    /// Explicit undefined leaf; reads that resolve nowhere degrade into
    /// this instruction with a diagnostic attached
    pub fn emit_undefined(&mut self, name: impl Into<String>) -> ValueId {
        let name = name.into();
        let mut node = Node::new(NodeKind::Undefined);
        node.variable = Some(name);
        self.emit_node(node)
    }

    // ------------------------------------------------------------------
    // aggregates
    // ------------------------------------------------------------------

    /// Fresh base aggregate (object/slice/map literal)
    pub fn emit_make(&mut self, len: Option<ValueId>, cap: Option<ValueId>) -> ValueId {
        self.emit_node(Node::new(NodeKind::Interface {
            parent: None,
            low: None,
            high: None,
            max: None,
            len,
            cap,
            fields: Vec::new(),
        }))
    }

    /// Sub-slice view over a parent aggregate
    pub fn emit_slice_view(
        &mut self,
        parent: ValueId,
        low: Option<ValueId>,
        high: Option<ValueId>,
        max: Option<ValueId>,
    ) -> ValueId {
        self.emit_node(Node::new(NodeKind::Interface {
            parent: Some(parent),
            low,
            high,
            max,
            len: None,
            cap: None,
            fields: Vec::new(),
        }))
    }

    /// Keyed projection off an aggregate. One field per (aggregate, key);
    /// repeated lookups return the recorded field.
    pub fn field(&mut self, object: ValueId, key: ValueId) -> ValueId {
        if let Some(NodeKind::Interface { fields, .. }) =
            self.program.nodes.get(object).map(|n| &n.kind)
        {
            if let Some(&(_, field)) = fields.iter().find(|(k, _)| *k == key) {
                return field;
            }
        }
        let field = self.emit_node(Node::new(NodeKind::Field {
            object,
            key,
            updates: Vec::new(),
            out_capture: false,
        }));
        if let Some(node) = self.program.nodes.get_mut(object) {
            if let NodeKind::Interface { fields, .. } = &mut node.kind {
                fields.push((key, field));
            }
        }
        // the aggregate reads its fields
        self.program.nodes.add_user(field, object);
        field
    }

    /// Record a write event against a field
    pub fn emit_update(&mut self, address: ValueId, value: ValueId) -> ValueId {
        let update = self.emit_node(Node::new(NodeKind::Update { address, value }));
        if let Some(node) = self.program.nodes.get_mut(address) {
            if let NodeKind::Field { updates, .. } = &mut node.kind {
                updates.push(update);
            }
        }
        // the field reads its updates
        self.program.nodes.add_user(update, address);
        update
    }

    // ------------------------------------------------------------------
    // variable resolution
    // ------------------------------------------------------------------

    /// Record `value` as the new reaching definition of `name` in the
    /// current block
    pub fn write_variable(&mut self, name: impl Into<String>, value: ValueId) {
        let frame = self.frame();
        self.write_variable_at(frame.func, frame.block, name, value);
    }

    /// Write with an explicit definition site. The site block can differ
    /// from the value's own block: a shared literal or an extern leaf is
    /// defined wherever the assignment happened, not where the node was
    /// first emitted.
    pub(crate) fn write_variable_at(
        &mut self,
        func: FuncId,
        block: BlockId,
        name: impl Into<String>,
        value: ValueId,
    ) {
        let name = name.into();
        if let Some(node) = self.program.nodes.get_mut(value) {
            if node.variable.is_none() {
                node.variable = Some(name.clone());
            }
        }
        self.program
            .func_mut(func)
            .symbol_table
            .entry(name)
            .or_default()
            .push((block, value));
    }

    /// Resolve a read of `name` at the end of the current block
    pub fn read_variable(&mut self, name: &str) -> Option<ValueId> {
        let block = self.frame().block;
        self.read_variable_by_block(name, block)
    }

    /// Resolve a read, materializing an `Undefined` diagnostic leaf when
    /// no definition reaches this point
    pub fn read_or_undefined(&mut self, name: &str) -> ValueId {
        if let Some(v) = self.read_variable(name) {
            return v;
        }
        self.stats.undefined_reads += 1;
        let undef = self.emit_undefined(name.to_string());
        let span = self.current_span;
        if let Some(node) = self.program.nodes.get_mut(undef) {
            let mut diag = Diagnostic::error(
                DiagnosticTag::Ssa,
                format!("undefined variable: {}", name),
            );
            if let Some(span) = span {
                diag = diag.with_span(span);
            }
            node.diags.push(diag);
        }
        self.write_variable(name.to_string(), undef);
        undef
    }

    pub(crate) fn read_variable_by_block(&mut self, name: &str, block: BlockId) -> Option<ValueId> {
        if let Some(local) = self.local_definition(name, block) {
            return Some(local);
        }
        self.read_variable_recursive(name, block)
    }

    /// Latest definition of `name` written in exactly this block
    fn local_definition(&self, name: &str, block: BlockId) -> Option<ValueId> {
        let func = self.program.block(block).func;
        let history = self.program.func(func).symbol_table.get(name)?;
        history
            .iter()
            .rev()
            .find(|(site, _)| *site == block)
            .map(|(_, def)| *def)
    }

    fn read_variable_recursive(&mut self, name: &str, block: BlockId) -> Option<ValueId> {
        let (sealed, preds) = {
            let b = self.program.block(block);
            (b.sealed, b.preds.clone())
        };
        if !sealed {
            // predecessor set still growing: queue an incomplete phi
            let phi = self.new_phi(block, name);
            self.program.block_mut(block).incomplete_phis.push(phi);
            let func = self.program.block(block).func;
            self.write_variable_at(func, block, name.to_string(), phi);
            trace!(variable = name, block = block.index(), "incomplete phi queued");
            return Some(phi);
        }
        match preds.len() {
            // entry or unreachable: no definition anywhere on this path
            0 => None,
            // no phi needed, fall through to the single predecessor
            1 => self.read_variable_by_block(name, preds[0]),
            _ => {
                let phi = self.new_phi(block, name);
                // record before filling edges so loop recursion terminates
                let func = self.program.block(block).func;
                self.write_variable_at(func, block, name.to_string(), phi);
                self.build_phi(phi)
            }
        }
    }

    /// Position-bounded read: only definitions recorded strictly before
    /// `inst` in its block count, then predecessor resolution applies.
    /// Used by the closure binding step at call sites.
    pub fn read_variable_before(&mut self, name: &str, inst: ValueId) -> Option<ValueId> {
        let block = self.program.nodes.get(inst).and_then(|n| n.block)?;
        let b = self.program.block(block);
        let pos = b.insts.iter().position(|&i| i == inst);
        let func = b.func;
        if let Some(history) = self.program.func(func).symbol_table.get(name) {
            for &(site, def) in history.iter().rev() {
                if site != block {
                    continue;
                }
                let b = self.program.block(block);
                // phis (installed or pending) precede every instruction
                if b.phis.contains(&def) || b.incomplete_phis.contains(&def) {
                    return Some(def);
                }
                match (b.insts.iter().position(|&i| i == def), pos) {
                    (Some(def_pos), Some(inst_pos)) if def_pos < inst_pos => return Some(def),
                    (Some(_), None) => return Some(def),
                    // the written value lives in another block (shared
                    // literal, extern leaf): the write itself happened at
                    // statement level, treat it as preceding the call
                    (None, _) => return Some(def),
                    // definition follows `inst` in this block: keep looking
                    _ => {}
                }
            }
        }
        self.read_variable_recursive(name, block)
    }

    // ------------------------------------------------------------------
    // sealing
    // ------------------------------------------------------------------

    /// Declare the predecessor set of `block` final and resolve its queued
    /// incomplete phis. The `skip` flag guards recursive re-entry while
    /// the worklist drains.
    pub fn seal_block(&mut self, block: BlockId) {
        {
            let b = self.program.block(block);
            if b.sealed || b.skip {
                return;
            }
        }
        self.program.block_mut(block).skip = true;
        self.program.block_mut(block).sealed = true;
        let queued = std::mem::take(&mut self.program.block_mut(block).incomplete_phis);
        let queued_len = queued.len();
        for phi in queued {
            self.build_phi(phi);
        }
        self.program.block_mut(block).skip = false;
        if queued_len > 0 {
            debug!(
                block = self.program.block(block).name.as_str(),
                resolved = queued_len,
                "block sealed"
            );
        }
    }

    // ------------------------------------------------------------------
    // free values
    // ------------------------------------------------------------------

    /// True when `name` resolves in some enclosing function scope
    pub fn can_build_free_value(&self, name: &str) -> bool {
        let mut parent = self
            .frames
            .last()
            .and_then(|f| self.program.func(f.func).parent);
        while let Some(func) = parent {
            let found = self
                .program
                .func(func)
                .symbol_table
                .get(name)
                .map(|history| !history.is_empty())
                .unwrap_or(false);
            if found {
                return true;
            }
            parent = self.program.func(func).parent;
        }
        false
    }

    /// Materialize a free-value placeholder for `name` in the current
    /// function, bound to the nearest enclosing definition. Free values
    /// are function-entry-scoped like parameters, so the definition is
    /// recorded at the enter block. The outer definition is marked as
    /// captured when it is an aggregate field.
    pub fn build_free_value(&mut self, name: &str) -> ValueId {
        let frame = self.frame();
        let enter = self.program.func(frame.func).enter;
        let mut node = Node::new(NodeKind::Parameter {
            is_free_value: true,
        });
        node.variable = Some(name.to_string());
        let fv = self.alloc_value(node, Some(frame.func));
        self.program.func_mut(frame.func).free_values.push(fv);
        self.write_variable_at(frame.func, enter, name.to_string(), fv);

        // mark the captured outer definition
        let mut parent = self.program.func(frame.func).parent;
        while let Some(func) = parent {
            let outer = self
                .program
                .func(func)
                .symbol_table
                .get(name)
                .and_then(|h| h.last())
                .map(|(_, v)| *v);
            if let Some(outer) = outer {
                if let Some(outer_node) = self.program.nodes.get_mut(outer) {
                    if let NodeKind::Field { out_capture, .. } = &mut outer_node.kind {
                        *out_capture = true;
                    }
                }
                break;
            }
            parent = self.program.func(func).parent;
        }
        fv
    }

    // ------------------------------------------------------------------
    // teardown
    // ------------------------------------------------------------------

    pub(crate) fn finish(&mut self) {
        while !self.frames.is_empty() {
            self.exit_function();
        }
        debug!(
            nodes = self.program.nodes.len(),
            phis_created = self.stats.phis_created,
            trivial_removed = self.stats.trivial_phis_removed,
            "construction finished"
        );
    }
}
