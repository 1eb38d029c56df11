//! Property test: use/def symmetry survives arbitrary sequences of
//! in-place replacements.

use proptest::prelude::*;

use scriptgraph_ir::{BinaryOp, ConstValue, Node, NodeArena, NodeKind, ValueId};

#[derive(Debug, Clone)]
enum Op {
    /// replace_value(user, old, new) by index into the node list
    ReplaceIn(usize, usize, usize),
    /// replace_all_uses(old, new) by index
    ReplaceAll(usize, usize),
}

fn build_graph(leaves: usize, pairs: &[(usize, usize)]) -> (NodeArena, Vec<ValueId>) {
    let mut arena = NodeArena::new();
    let mut ids = Vec::new();
    for i in 0..leaves {
        ids.push(arena.alloc(Node::new(NodeKind::Const {
            value: ConstValue::Int(i as i64),
        })));
    }
    for &(x, y) in pairs {
        let x = ids[x % ids.len()];
        let y = ids[y % ids.len()];
        let op = arena.alloc(Node::new(NodeKind::BinOp {
            op: BinaryOp::Add,
            x,
            y,
        }));
        arena.add_user(x, op);
        arena.add_user(y, op);
        ids.push(op);
    }
    (arena, ids)
}

fn assert_symmetry(arena: &NodeArena) {
    for (id, node) in arena.iter() {
        for op in node.operands() {
            assert!(
                arena.users(op).contains(&id),
                "{} reads {} but is missing from its user set",
                id,
                op
            );
        }
        for &user in &node.users {
            let user_node = arena.get(user).expect("tracked user is dead");
            assert!(
                user_node.operands().contains(&id),
                "{} tracked as user of {} without reading it",
                user,
                id
            );
        }
    }
}

proptest! {
    #[test]
    fn use_def_symmetry_under_arbitrary_replacements(
        leaves in 2usize..6,
        pairs in prop::collection::vec((0usize..16, 0usize..16), 1..12),
        ops in prop::collection::vec(
            prop_oneof![
                (0usize..64, 0usize..64, 0usize..64)
                    .prop_map(|(u, o, n)| Op::ReplaceIn(u, o, n)),
                (0usize..64, 0usize..64).prop_map(|(o, n)| Op::ReplaceAll(o, n)),
            ],
            0..24,
        ),
    ) {
        let (mut arena, ids) = build_graph(leaves, &pairs);
        for op in ops {
            match op {
                Op::ReplaceIn(user, old, new) => {
                    let user = ids[user % ids.len()];
                    let old = ids[old % ids.len()];
                    let new = ids[new % ids.len()];
                    arena.replace_value(user, old, new);
                }
                Op::ReplaceAll(old, new) => {
                    let old = ids[old % ids.len()];
                    let new = ids[new % ids.len()];
                    arena.replace_all_uses(old, new);
                }
            }
            assert_symmetry(&arena);
        }
        assert_symmetry(&arena);
    }
}
