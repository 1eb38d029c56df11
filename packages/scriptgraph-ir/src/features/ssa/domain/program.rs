//! Containment hierarchy: Program → Package → Function → BasicBlock
//!
//! The `Program` owns every arena (nodes, functions, blocks) so the whole
//! graph has a single owner; entities reference each other through
//! handles. Blocks keep mutual predecessor/successor lists: the only way
//! to add a control-flow edge is `add_edge`, which updates both sides.

use ahash::AHashMap;
use tracing::warn;

use crate::shared::models::Diagnostic;
use crate::features::type_system::TypeId;

use super::node::{NodeArena, NodeKind, ValueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackageId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub(crate) u32);

impl PackageId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl FuncId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl BlockId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Named collection of functions
#[derive(Debug)]
pub struct Package {
    pub name: String,
    pub funcs: Vec<FuncId>,
}

/// One function under construction or finished
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub package: PackageId,
    pub params: Vec<ValueId>,
    pub returns: Vec<ValueId>,
    pub param_types: Vec<TypeId>,
    pub return_types: Vec<TypeId>,
    pub has_ellipsis: bool,
    pub blocks: Vec<BlockId>,
    pub enter: BlockId,
    pub exit: BlockId,
    /// Anonymous functions defined inside this function
    pub anon_funcs: Vec<FuncId>,
    /// Parent function when this function is itself anonymous
    pub parent: Option<FuncId>,
    /// Values captured from enclosing scopes
    pub free_values: Vec<ValueId>,
    /// Variable name → history of (writing block, defining value), in
    /// emission order. The builder's variable resolution walks this
    /// backward. The block is the one the write happened in, which can
    /// differ from the value's own block (shared literals, extern
    /// leaves).
    pub symbol_table: AHashMap<String, Vec<(BlockId, ValueId)>>,
    /// Function-level diagnostics (instruction-level ones live on nodes)
    pub diags: Vec<Diagnostic>,
}

/// One basic block
#[derive(Debug)]
pub struct BasicBlock {
    pub index: usize,
    pub name: String,
    pub func: FuncId,
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
    /// Ordered instruction list
    pub insts: Vec<ValueId>,
    /// Installed (non-trivial) phis
    pub phis: Vec<ValueId>,
    /// No more predecessors will be added
    pub sealed: bool,
    /// A terminator has been emitted
    pub finished: bool,
    /// Phis awaiting resolution once the block seals
    pub incomplete_phis: Vec<ValueId>,
    /// Transient guard against recursive re-entry during phi resolution
    pub skip: bool,
}

/// The whole IR graph: packages plus the node/function/block arenas
#[derive(Debug, Default)]
pub struct Program {
    pub packages: Vec<Package>,
    pub(crate) funcs: Vec<Function>,
    pub(crate) blocks: Vec<BasicBlock>,
    pub nodes: NodeArena,
    built: bool,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the single-build guard. Returns false when the program was
    /// already built; building twice is an idempotent no-op by design.
    pub(crate) fn mark_built(&mut self) -> bool {
        if self.built {
            return false;
        }
        self.built = true;
        true
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    pub fn new_package(&mut self, name: impl Into<String>) -> PackageId {
        let id = PackageId(self.packages.len() as u32);
        self.packages.push(Package {
            name: name.into(),
            funcs: Vec::new(),
        });
        id
    }

    pub fn package(&self, id: PackageId) -> &Package {
        &self.packages[id.index()]
    }

    /// Create a function with its enter/exit block pair. The enter block
    /// has no predecessors by construction and is sealed immediately.
    pub fn new_function(
        &mut self,
        package: PackageId,
        name: impl Into<String>,
        parent: Option<FuncId>,
    ) -> FuncId {
        let id = FuncId(self.funcs.len() as u32);
        let enter = self.push_block(id, "entry");
        self.blocks[enter.index()].sealed = true;
        let exit = self.push_block(id, "exit");
        self.funcs.push(Function {
            name: name.into(),
            package,
            params: Vec::new(),
            returns: Vec::new(),
            param_types: Vec::new(),
            return_types: Vec::new(),
            has_ellipsis: false,
            blocks: vec![enter, exit],
            enter,
            exit,
            anon_funcs: Vec::new(),
            parent,
            free_values: Vec::new(),
            symbol_table: AHashMap::new(),
            diags: Vec::new(),
        });
        self.packages[package.index()].funcs.push(id);
        if let Some(parent) = parent {
            self.funcs[parent.index()].anon_funcs.push(id);
        }
        id
    }

    pub fn func(&self, id: FuncId) -> &Function {
        &self.funcs[id.index()]
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.funcs[id.index()]
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.funcs
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId(i as u32), f))
    }

    fn push_block(&mut self, func: FuncId, name: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock {
            index: id.index(),
            name: name.into(),
            func,
            preds: Vec::new(),
            succs: Vec::new(),
            insts: Vec::new(),
            phis: Vec::new(),
            sealed: false,
            finished: false,
            incomplete_phis: Vec::new(),
            skip: false,
        });
        id
    }

    pub fn new_block(&mut self, func: FuncId, name: impl Into<String>) -> BlockId {
        let id = self.push_block(func, name);
        self.funcs[func.index()].blocks.push(id);
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    /// Add a control-flow edge, keeping the pred/succ lists mutual duals.
    /// Adding a predecessor to a sealed block would invalidate phis built
    /// against the predecessor list; that is builder misuse, logged and
    /// ignored.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        if self.blocks[to.index()].sealed {
            warn!(
                from = self.blocks[from.index()].name.as_str(),
                to = self.blocks[to.index()].name.as_str(),
                "edge into sealed block ignored"
            );
            return;
        }
        self.blocks[from.index()].succs.push(to);
        self.blocks[to.index()].preds.push(from);
    }

    /// Aggregate diagnostics of a function: its own plus every
    /// instruction-level diagnostic in its blocks.
    pub fn function_diagnostics(&self, id: FuncId) -> Vec<Diagnostic> {
        let func = self.func(id);
        let mut out = func.diags.clone();
        for &block in &func.blocks {
            let block = self.block(block);
            for &inst in block.phis.iter().chain(block.insts.iter()) {
                if let Some(node) = self.nodes.get(inst) {
                    out.extend(node.diags.iter().cloned());
                }
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // SSA text rendering (virtual-register numbering per function)
    // ------------------------------------------------------------------

    /// Render one function as an SSA-style listing. Instruction values are
    /// numbered `%N` deterministically in block order.
    pub fn render_function(&self, id: FuncId) -> String {
        let func = self.func(id);
        let mut regs: AHashMap<ValueId, usize> = AHashMap::new();
        for &block in &func.blocks {
            let block = self.block(block);
            for &v in block.phis.iter().chain(block.insts.iter()) {
                let n = regs.len();
                regs.entry(v).or_insert(n);
            }
        }

        let mut out = String::new();
        let params: Vec<String> = func
            .params
            .iter()
            .filter_map(|p| self.nodes.get(*p).and_then(|n| n.variable.clone()))
            .collect();
        out.push_str(&format!("func {}({}) {{\n", func.name, params.join(", ")));
        for &bid in &func.blocks {
            let block = self.block(bid);
            if block.insts.is_empty() && block.phis.is_empty() {
                continue;
            }
            out.push_str(&format!("{}:", block.name));
            if !block.preds.is_empty() {
                let preds: Vec<&str> = block
                    .preds
                    .iter()
                    .map(|p| self.block(*p).name.as_str())
                    .collect();
                out.push_str(&format!("  ; preds: {}", preds.join(", ")));
            }
            out.push('\n');
            for &v in block.phis.iter().chain(block.insts.iter()) {
                out.push_str("    ");
                out.push_str(&self.render_inst(&regs, v));
                out.push('\n');
            }
        }
        out.push_str("}\n");
        out
    }

    fn render_operand(&self, regs: &AHashMap<ValueId, usize>, id: ValueId) -> String {
        if let Some(n) = regs.get(&id) {
            return format!("%{}", n);
        }
        match self.nodes.get(id) {
            Some(node) => match &node.kind {
                NodeKind::Const { value } => value.to_string(),
                NodeKind::Parameter { .. } | NodeKind::Undefined => node
                    .variable
                    .clone()
                    .unwrap_or_else(|| id.to_string()),
                _ => id.to_string(),
            },
            None => format!("{}?", id),
        }
    }

    fn render_inst(&self, regs: &AHashMap<ValueId, usize>, id: ValueId) -> String {
        let node = match self.nodes.get(id) {
            Some(n) => n,
            None => return format!("{}?", id),
        };
        let lhs = regs
            .get(&id)
            .map(|n| format!("%{} = ", n))
            .unwrap_or_default();
        let body = match &node.kind {
            NodeKind::Const { value } => format!("const {}", value),
            NodeKind::Parameter { is_free_value } => {
                let name = node.variable.as_deref().unwrap_or("_");
                if *is_free_value {
                    format!("freevalue {}", name)
                } else {
                    format!("param {}", name)
                }
            }
            NodeKind::Undefined => {
                format!("undefined {}", node.variable.as_deref().unwrap_or("_"))
            }
            NodeKind::FunctionRef { func } => {
                format!("func &{}", self.func(*func).name)
            }
            NodeKind::Phi { edges } => match node.block {
                Some(block) => {
                    let preds = &self.block(block).preds;
                    let arms: Vec<String> = edges
                        .iter()
                        .enumerate()
                        .map(|(i, e)| {
                            let pred = preds
                                .get(i)
                                .map(|p| self.block(*p).name.clone())
                                .unwrap_or_else(|| "?".to_string());
                            match e {
                                Some(v) => {
                                    format!("[{}, {}]", self.render_operand(regs, *v), pred)
                                }
                                None => format!("[_, {}]", pred),
                            }
                        })
                        .collect();
                    format!("phi {}", arms.join(" "))
                }
                None => "phi ?".to_string(),
            },
            NodeKind::Jump { to } => format!("jump {}", self.block(*to).name),
            NodeKind::If {
                cond,
                then_block,
                else_block,
            } => format!(
                "if {} then {} else {}",
                self.render_operand(regs, *cond),
                self.block(*then_block).name,
                self.block(*else_block).name
            ),
            NodeKind::Return { results } => {
                let rs: Vec<String> = results
                    .iter()
                    .map(|r| self.render_operand(regs, *r))
                    .collect();
                format!("ret {}", rs.join(", "))
            }
            NodeKind::Switch {
                cond,
                default,
                labels,
            } => {
                let arms: Vec<String> = labels
                    .iter()
                    .map(|l| {
                        format!(
                            "{} => {}",
                            self.render_operand(regs, l.value),
                            self.block(l.dest).name
                        )
                    })
                    .collect();
                format!(
                    "switch {} [{}] default {}",
                    self.render_operand(regs, *cond),
                    arms.join(", "),
                    self.block(*default).name
                )
            }
            NodeKind::Call {
                target,
                args,
                binding,
                ..
            } => {
                let args: Vec<String> =
                    args.iter().map(|a| self.render_operand(regs, *a)).collect();
                let mut s = format!(
                    "call {}({})",
                    self.render_operand(regs, *target),
                    args.join(", ")
                );
                if !binding.is_empty() {
                    let bs: Vec<String> = binding
                        .iter()
                        .map(|b| self.render_operand(regs, *b))
                        .collect();
                    s.push_str(&format!(" bind[{}]", bs.join(", ")));
                }
                s
            }
            NodeKind::BinOp { op, x, y } => format!(
                "{} {} {}",
                self.render_operand(regs, *x),
                op.symbol(),
                self.render_operand(regs, *y)
            ),
            NodeKind::UnOp { op, x } => {
                format!("{}{}", op.symbol(), self.render_operand(regs, *x))
            }
            NodeKind::Interface { parent, .. } => match parent {
                Some(p) => format!("slice {}", self.render_operand(regs, *p)),
                None => "make object".to_string(),
            },
            NodeKind::Field { object, key, .. } => format!(
                "field {}[{}]",
                self.render_operand(regs, *object),
                self.render_operand(regs, *key)
            ),
            NodeKind::Update { address, value } => format!(
                "update {} <- {}",
                self.render_operand(regs, *address),
                self.render_operand(regs, *value)
            ),
            NodeKind::SideEffect { call } => format!(
                "side-effect {} of {}",
                node.variable.as_deref().unwrap_or("_"),
                self.render_operand(regs, *call)
            ),
        };
        format!("{}{}", lhs, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_are_mutual() {
        let mut program = Program::new();
        let pkg = program.new_package("main");
        let f = program.new_function(pkg, "main", None);
        let a = program.new_block(f, "a");
        let b = program.new_block(f, "b");
        program.add_edge(a, b);
        assert_eq!(program.block(a).succs, vec![b]);
        assert_eq!(program.block(b).preds, vec![a]);
    }

    #[test]
    fn test_edge_into_sealed_block_ignored() {
        let mut program = Program::new();
        let pkg = program.new_package("main");
        let f = program.new_function(pkg, "main", None);
        let a = program.new_block(f, "a");
        let b = program.new_block(f, "b");
        program.block_mut(b).sealed = true;
        program.add_edge(a, b);
        assert!(program.block(a).succs.is_empty());
        assert!(program.block(b).preds.is_empty());
    }

    #[test]
    fn test_function_gets_enter_exit_pair() {
        let mut program = Program::new();
        let pkg = program.new_package("main");
        let f = program.new_function(pkg, "main", None);
        let func = program.func(f);
        assert_eq!(func.blocks.len(), 2);
        assert_eq!(func.blocks[0], func.enter);
        assert_eq!(func.blocks[1], func.exit);
        // entry has no predecessors by construction
        assert!(program.block(func.enter).sealed);
    }

    #[test]
    fn test_build_guard_is_idempotent() {
        let mut program = Program::new();
        assert!(program.mark_built());
        assert!(!program.mark_built());
        assert!(program.is_built());
    }

    #[test]
    fn test_anonymous_function_parent_link() {
        let mut program = Program::new();
        let pkg = program.new_package("main");
        let outer = program.new_function(pkg, "outer", None);
        let inner = program.new_function(pkg, "outer$1", Some(outer));
        assert_eq!(program.func(inner).parent, Some(outer));
        assert_eq!(program.func(outer).anon_funcs, vec![inner]);
    }
}
