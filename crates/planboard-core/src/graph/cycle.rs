//! Three-colour depth-first cycle detection.
//!
//! Used on plan-local indices while validating model output and on task ids
//! whenever an edge is added to a live graph. Iterative so deep chains cannot
//! overflow the stack.

use std::collections::BTreeMap;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

/// Find one cycle in a directed graph given as an adjacency map.
///
/// Returns the nodes of the first cycle found, starting and ending at the
/// node the back-edge points to (`[a, b, a]`). Targets that are not keys of
/// `adjacency` are treated as sinks. Runs in O(V + E); iteration order is
/// deterministic because the map is ordered.
pub fn find_cycle<N: Copy + Ord>(adjacency: &BTreeMap<N, Vec<N>>) -> Option<Vec<N>> {
    let mut colour: BTreeMap<N, Colour> = adjacency.keys().map(|&n| (n, Colour::White)).collect();

    for &root in adjacency.keys() {
        if colour.get(&root) != Some(&Colour::White) {
            continue;
        }

        // Each frame is (node, index of the next outgoing edge to visit).
        let mut stack: Vec<(N, usize)> = vec![(root, 0)];
        colour.insert(root, Colour::Grey);

        while let Some(frame) = stack.last_mut() {
            let (node, next) = *frame;
            frame.1 += 1;
            let edges = adjacency.get(&node).map(Vec::as_slice).unwrap_or(&[]);
            if let Some(&target) = edges.get(next) {
                match colour.get(&target).copied().unwrap_or(Colour::Black) {
                    Colour::White => {
                        colour.insert(target, Colour::Grey);
                        stack.push((target, 0));
                    }
                    Colour::Grey => {
                        let start = stack
                            .iter()
                            .position(|&(n, _)| n == target)
                            .unwrap_or(0);
                        let mut cycle: Vec<N> = stack[start..].iter().map(|&(n, _)| n).collect();
                        cycle.push(target);
                        return Some(cycle);
                    }
                    Colour::Black => {}
                }
            } else {
                colour.insert(node, Colour::Black);
                stack.pop();
            }
        }
    }

    None
}
