//! Bytecode scalar expression graph: the scalar-graph representation.
//!
//! A [`ScalarGraph`] is a flat, topologically ordered list of scalar
//! nodes built once through a [`GraphBuilder`] and then immutable. It
//! implements the full representation contract: a zero-order
//! interpreter sweep, forward tangent sweeps, a reverse
//! multiply-accumulate adjoint sweep with zero-adjoint skipping,
//! 64-way bit-level dependency propagation in both directions, and
//! symbolic differentiation (`derive`) that emits a new graph for a
//! Jacobian block, which makes Jacobian-of-Jacobian (Hessian)
//! construction ordinary composition.

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::buffer::Buffer;
use crate::error::Result;
use crate::float::Float;
use crate::repr::{check_shapes, DepWords, Representation, ReprKind};

/// Scalar node operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Op {
    /// Leaf reading one entry of an input slot: `args = [slot, entry]`.
    Input,
    /// Leaf reading a constant: `args[0]` indexes the constant table.
    Const,
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    Sin,
    Cos,
    Exp,
    Ln,
    Sqrt,
}

/// Operand slot left unused by unary ops and leaves.
const UNUSED: u32 = u32::MAX;

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct Node {
    op: Op,
    args: [u32; 2],
}

/// Handle to a node inside a [`GraphBuilder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeId(u32);

/// Incremental builder for a [`ScalarGraph`].
///
/// Declare input slots, combine node handles with the arithmetic
/// methods, bind output slots, then [`finish`](GraphBuilder::finish).
/// Node handles are only meaningful within the builder that issued
/// them.
pub struct GraphBuilder<F: Float> {
    nodes: Vec<Node>,
    consts: Vec<F>,
    input_shapes: Vec<(usize, usize)>,
    output_shapes: Vec<(usize, usize)>,
    outputs: Vec<Vec<u32>>,
}

impl<F: Float> Default for GraphBuilder<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> GraphBuilder<F> {
    pub fn new() -> Self {
        GraphBuilder {
            nodes: Vec::new(),
            consts: Vec::new(),
            input_shapes: Vec::new(),
            output_shapes: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn push(&mut self, op: Op, args: [u32; 2]) -> NodeId {
        let id = self.nodes.len() as u32;
        self.nodes.push(Node { op, args });
        NodeId(id)
    }

    /// Declare an input slot of the given shape. Returns one node
    /// handle per entry, in row-major order.
    pub fn input(&mut self, nrow: usize, ncol: usize) -> Vec<NodeId> {
        let slot = self.input_shapes.len() as u32;
        self.input_shapes.push((nrow, ncol));
        (0..nrow * ncol)
            .map(|entry| self.push(Op::Input, [slot, entry as u32]))
            .collect()
    }

    /// A constant leaf.
    pub fn constant(&mut self, value: F) -> NodeId {
        let cid = self.consts.len() as u32;
        self.consts.push(value);
        self.push(Op::Const, [cid, UNUSED])
    }

    pub fn add(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.push(Op::Add, [a.0, b.0])
    }

    pub fn sub(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.push(Op::Sub, [a.0, b.0])
    }

    pub fn mul(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.push(Op::Mul, [a.0, b.0])
    }

    pub fn div(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.push(Op::Div, [a.0, b.0])
    }

    pub fn neg(&mut self, a: NodeId) -> NodeId {
        self.push(Op::Neg, [a.0, UNUSED])
    }

    pub fn sin(&mut self, a: NodeId) -> NodeId {
        self.push(Op::Sin, [a.0, UNUSED])
    }

    pub fn cos(&mut self, a: NodeId) -> NodeId {
        self.push(Op::Cos, [a.0, UNUSED])
    }

    pub fn exp(&mut self, a: NodeId) -> NodeId {
        self.push(Op::Exp, [a.0, UNUSED])
    }

    pub fn ln(&mut self, a: NodeId) -> NodeId {
        self.push(Op::Ln, [a.0, UNUSED])
    }

    pub fn sqrt(&mut self, a: NodeId) -> NodeId {
        self.push(Op::Sqrt, [a.0, UNUSED])
    }

    /// Bind an output slot of the given shape to `entries`, one node
    /// handle per entry in row-major order.
    ///
    /// # Panics
    ///
    /// Panics if the entry count does not match the shape.
    pub fn output(&mut self, nrow: usize, ncol: usize, entries: &[NodeId]) {
        assert_eq!(
            entries.len(),
            nrow * ncol,
            "output slot shape ({nrow}x{ncol}) needs {} entries, got {}",
            nrow * ncol,
            entries.len()
        );
        self.output_shapes.push((nrow, ncol));
        self.outputs.push(entries.iter().map(|e| e.0).collect());
    }

    /// Freeze the builder into an immutable graph.
    pub fn finish(self) -> ScalarGraph<F> {
        ScalarGraph {
            nodes: self.nodes,
            consts: self.consts,
            input_shapes: self.input_shapes,
            output_shapes: self.output_shapes,
            outputs: self.outputs,
        }
    }
}

/// Immutable scalar expression graph.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScalarGraph<F: Float> {
    nodes: Vec<Node>,
    consts: Vec<F>,
    input_shapes: Vec<(usize, usize)>,
    output_shapes: Vec<(usize, usize)>,
    /// `outputs[slot][entry]` is the node feeding that output entry.
    outputs: Vec<Vec<u32>>,
}

impl<F: Float> ScalarGraph<F> {
    /// Number of nodes in the graph.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Zero-order interpreter sweep into a caller-provided work array.
    ///
    /// Plain IEEE arithmetic: overflow, division by zero and domain
    /// violations propagate as inf/NaN, same as the numeric
    /// representation.
    fn sweep_values(&self, inputs: &[Buffer<F>], work: &mut Vec<F>) {
        work.clear();
        work.reserve(self.nodes.len());
        for node in &self.nodes {
            let [a, b] = node.args;
            let value = match node.op {
                Op::Input => inputs[a as usize].as_slice()[b as usize],
                Op::Const => self.consts[a as usize],
                Op::Add => work[a as usize] + work[b as usize],
                Op::Sub => work[a as usize] - work[b as usize],
                Op::Mul => work[a as usize] * work[b as usize],
                Op::Div => work[a as usize] / work[b as usize],
                Op::Neg => -work[a as usize],
                Op::Sin => work[a as usize].sin(),
                Op::Cos => work[a as usize].cos(),
                Op::Exp => work[a as usize].exp(),
                Op::Ln => work[a as usize].ln(),
                Op::Sqrt => work[a as usize].sqrt(),
            };
            work.push(value);
        }
    }
}

impl<F: Float> Representation<F> for ScalarGraph<F> {
    fn kind(&self) -> ReprKind {
        ReprKind::ScalarGraph
    }

    fn input_shapes(&self) -> &[(usize, usize)] {
        &self.input_shapes
    }

    fn output_shapes(&self) -> &[(usize, usize)] {
        &self.output_shapes
    }

    fn eval(&self, inputs: &[Buffer<F>], outputs: &mut [Buffer<F>]) -> Result<()> {
        check_shapes(inputs, &self.input_shapes)?;
        check_shapes(outputs, &self.output_shapes)?;
        let mut work = Vec::new();
        self.sweep_values(inputs, &mut work);
        for (slot, entries) in self.outputs.iter().enumerate() {
            let out = outputs[slot].as_mut_slice();
            for (e, &node) in entries.iter().enumerate() {
                out[e] = work[node as usize];
            }
        }
        Ok(())
    }

    fn eval_forward(
        &self,
        inputs: &[Buffer<F>],
        _outputs: &[Buffer<F>],
        seeds: &[Buffer<F>],
        sens: &mut [Buffer<F>],
    ) -> Result<()> {
        check_shapes(inputs, &self.input_shapes)?;
        check_shapes(seeds, &self.input_shapes)?;
        check_shapes(sens, &self.output_shapes)?;
        let mut work = Vec::new();
        self.sweep_values(inputs, &mut work);

        // Tangent sweep: same order, dual-number rules per op. The value
        // sweep is complete, so a node's own result `work[i]` is reusable.
        let mut tan = Vec::with_capacity(self.nodes.len());
        for (i, node) in self.nodes.iter().enumerate() {
            let [a, b] = node.args;
            let (ai, bi) = (a as usize, b as usize);
            let t = match node.op {
                Op::Input => seeds[ai].as_slice()[bi],
                Op::Const => F::zero(),
                Op::Add => tan[ai] + tan[bi],
                Op::Sub => tan[ai] - tan[bi],
                Op::Mul => tan[ai] * work[bi] + work[ai] * tan[bi],
                Op::Div => (tan[ai] - work[i] * tan[bi]) / work[bi],
                Op::Neg => -tan[ai],
                Op::Sin => tan[ai] * work[ai].cos(),
                Op::Cos => -tan[ai] * work[ai].sin(),
                Op::Exp => tan[ai] * work[i],
                Op::Ln => tan[ai] / work[ai],
                Op::Sqrt => tan[ai] / (work[i] + work[i]),
            };
            tan.push(t);
        }

        for (slot, entries) in self.outputs.iter().enumerate() {
            let out = sens[slot].as_mut_slice();
            for (e, &node) in entries.iter().enumerate() {
                out[e] = tan[node as usize];
            }
        }
        Ok(())
    }

    fn eval_adjoint(
        &self,
        inputs: &[Buffer<F>],
        _outputs: &[Buffer<F>],
        seeds: &[Buffer<F>],
        sens: &mut [Buffer<F>],
    ) -> Result<()> {
        check_shapes(inputs, &self.input_shapes)?;
        check_shapes(seeds, &self.output_shapes)?;
        check_shapes(sens, &self.input_shapes)?;
        let mut work = Vec::new();
        self.sweep_values(inputs, &mut work);

        // Seed output-node adjoints; entries may alias the same node.
        let mut adj = vec![F::zero(); self.nodes.len()];
        for (slot, entries) in self.outputs.iter().enumerate() {
            let seed = seeds[slot].as_slice();
            for (e, &node) in entries.iter().enumerate() {
                adj[node as usize] = adj[node as usize] + seed[e];
            }
        }

        // Reverse multiply-accumulate sweep with zero-adjoint skipping.
        for i in (0..self.nodes.len()).rev() {
            let a_bar = adj[i];
            if a_bar == F::zero() {
                continue;
            }
            let Node { op, args: [a, b] } = self.nodes[i];
            let (ai, bi) = (a as usize, b as usize);
            match op {
                Op::Input | Op::Const => {}
                Op::Add => {
                    adj[ai] = adj[ai] + a_bar;
                    adj[bi] = adj[bi] + a_bar;
                }
                Op::Sub => {
                    adj[ai] = adj[ai] + a_bar;
                    adj[bi] = adj[bi] - a_bar;
                }
                Op::Mul => {
                    adj[ai] = adj[ai] + a_bar * work[bi];
                    adj[bi] = adj[bi] + a_bar * work[ai];
                }
                Op::Div => {
                    adj[ai] = adj[ai] + a_bar / work[bi];
                    adj[bi] = adj[bi] - a_bar * work[i] / work[bi];
                }
                Op::Neg => adj[ai] = adj[ai] - a_bar,
                Op::Sin => adj[ai] = adj[ai] + a_bar * work[ai].cos(),
                Op::Cos => adj[ai] = adj[ai] - a_bar * work[ai].sin(),
                Op::Exp => adj[ai] = adj[ai] + a_bar * work[i],
                Op::Ln => adj[ai] = adj[ai] + a_bar / work[ai],
                Op::Sqrt => adj[ai] = adj[ai] + a_bar / (work[i] + work[i]),
            }
        }

        // Accumulate leaf adjoints into the input sensitivities.
        for (i, node) in self.nodes.iter().enumerate() {
            if node.op == Op::Input {
                let [slot, entry] = node.args;
                let s = sens[slot as usize].as_mut_slice();
                s[entry as usize] = s[entry as usize] + adj[i];
            }
        }
        Ok(())
    }

    fn can_propagate(&self, _forward: bool) -> bool {
        true
    }

    fn propagate(
        &self,
        input_dep: &mut [&mut DepWords],
        output_dep: &mut [&mut DepWords],
        forward: bool,
    ) -> Result<()> {
        let mut words = vec![0u64; self.nodes.len()];
        if forward {
            for (i, node) in self.nodes.iter().enumerate() {
                let [a, b] = node.args;
                words[i] = match node.op {
                    Op::Input => input_dep[a as usize][b as usize],
                    Op::Const => 0,
                    Op::Add | Op::Sub | Op::Mul | Op::Div => {
                        words[a as usize] | words[b as usize]
                    }
                    _ => words[a as usize],
                };
            }
            for (slot, entries) in self.outputs.iter().enumerate() {
                for (e, &node) in entries.iter().enumerate() {
                    output_dep[slot][e] = words[node as usize];
                }
            }
        } else {
            for (slot, entries) in self.outputs.iter().enumerate() {
                for (e, &node) in entries.iter().enumerate() {
                    words[node as usize] |= output_dep[slot][e];
                }
            }
            for i in (0..self.nodes.len()).rev() {
                let w = words[i];
                if w == 0 {
                    continue;
                }
                let Node { op, args: [a, b] } = self.nodes[i];
                match op {
                    Op::Input => {
                        input_dep[a as usize][b as usize] |= w;
                    }
                    Op::Const => {}
                    Op::Add | Op::Sub | Op::Mul | Op::Div => {
                        words[a as usize] |= w;
                        words[b as usize] |= w;
                    }
                    _ => words[a as usize] |= w,
                }
            }
        }
        Ok(())
    }

    fn derive(&self, iind: usize, oind: usize) -> Option<Box<dyn Representation<F>>> {
        if iind >= self.input_shapes.len() || oind >= self.output_shapes.len() {
            return None;
        }
        Some(Box::new(derive_graph(self, iind, oind)))
    }
}

/// Forward-mode source transformation: emit a new graph whose single
/// output is the Jacobian block d(output `oind`) / d(input `iind`).
///
/// Every parent input slot is mirrored so the derived graph takes the
/// same inputs. One tangent pass per seeded input entry; structurally
/// zero tangents are elided rather than materialized, so the derived
/// graph inherits the parent's sparsity. Local partials (`cos a`,
/// `sin a`, ...) are cached per parent node and shared across seeds.
fn derive_graph<F: Float>(parent: &ScalarGraph<F>, iind: usize, oind: usize) -> ScalarGraph<F> {
    let mut b = GraphBuilder::new();

    // Mirror the parent's value computation.
    let mut value: Vec<NodeId> = Vec::with_capacity(parent.nodes.len());
    let mut input_entries: Vec<Vec<NodeId>> = Vec::new();
    for &(r, c) in &parent.input_shapes {
        input_entries.push(b.input(r, c));
    }
    for node in &parent.nodes {
        let [a0, a1] = node.args;
        let (ai, bi) = (a0 as usize, a1 as usize);
        let id = match node.op {
            Op::Input => input_entries[ai][bi],
            Op::Const => b.constant(parent.consts[ai]),
            Op::Add => b.add(value[ai], value[bi]),
            Op::Sub => b.sub(value[ai], value[bi]),
            Op::Mul => b.mul(value[ai], value[bi]),
            Op::Div => b.div(value[ai], value[bi]),
            Op::Neg => b.neg(value[ai]),
            Op::Sin => b.sin(value[ai]),
            Op::Cos => b.cos(value[ai]),
            Op::Exp => b.exp(value[ai]),
            Op::Ln => b.ln(value[ai]),
            Op::Sqrt => b.sqrt(value[ai]),
        };
        value.push(id);
    }

    let (or, oc) = parent.output_shapes[oind];
    let m = or * oc;
    let (ir, ic) = parent.input_shapes[iind];
    let n = ir * ic;

    // Local-partial cache shared across all seed directions.
    let mut partials: HashMap<u32, NodeId> = HashMap::new();

    let mut jac_entries: Vec<Option<NodeId>> = vec![None; m * n];
    for j in 0..n {
        // Tangent of each parent node under the unit seed on entry j;
        // `None` means structurally zero.
        let mut tan: Vec<Option<NodeId>> = Vec::with_capacity(parent.nodes.len());
        let mut one: Option<NodeId> = None;
        for (idx, node) in parent.nodes.iter().enumerate() {
            let [a0, a1] = node.args;
            let (ai, bi) = (a0 as usize, a1 as usize);
            let t = match node.op {
                Op::Input => {
                    if ai == iind && bi == j {
                        Some(*one.get_or_insert_with(|| b.constant(F::one())))
                    } else {
                        None
                    }
                }
                Op::Const => None,
                Op::Add => match (tan[ai], tan[bi]) {
                    (Some(x), Some(y)) => Some(b.add(x, y)),
                    (t, None) | (None, t) => t,
                },
                Op::Sub => match (tan[ai], tan[bi]) {
                    (Some(x), Some(y)) => Some(b.sub(x, y)),
                    (t, None) => t,
                    (None, Some(y)) => Some(b.neg(y)),
                },
                Op::Mul => {
                    let left = tan[ai].map(|t| b.mul(t, value[bi]));
                    let right = tan[bi].map(|t| b.mul(value[ai], t));
                    match (left, right) {
                        (Some(x), Some(y)) => Some(b.add(x, y)),
                        (t, None) | (None, t) => t,
                    }
                }
                Op::Div => {
                    // (ta - y * tb) / b, with y the parent quotient.
                    let num = match (tan[ai], tan[bi]) {
                        (Some(ta), Some(tb)) => {
                            let ytb = b.mul(value[idx], tb);
                            Some(b.sub(ta, ytb))
                        }
                        (Some(ta), None) => Some(ta),
                        (None, Some(tb)) => {
                            let ytb = b.mul(value[idx], tb);
                            Some(b.neg(ytb))
                        }
                        (None, None) => None,
                    };
                    num.map(|x| b.div(x, value[bi]))
                }
                Op::Neg => tan[ai].map(|t| b.neg(t)),
                Op::Sin => tan[ai].map(|t| {
                    let d = *partials
                        .entry(idx as u32)
                        .or_insert_with(|| b.cos(value[ai]));
                    b.mul(t, d)
                }),
                Op::Cos => tan[ai].map(|t| {
                    let d = *partials
                        .entry(idx as u32)
                        .or_insert_with(|| b.sin(value[ai]));
                    let td = b.mul(t, d);
                    b.neg(td)
                }),
                Op::Exp => tan[ai].map(|t| b.mul(t, value[idx])),
                Op::Ln => tan[ai].map(|t| b.div(t, value[ai])),
                Op::Sqrt => tan[ai].map(|t| {
                    let d = *partials
                        .entry(idx as u32)
                        .or_insert_with(|| b.add(value[idx], value[idx]));
                    b.div(t, d)
                }),
            };
            tan.push(t);
        }
        for (i, &node) in parent.outputs[oind].iter().enumerate() {
            jac_entries[i * n + j] = tan[node as usize];
        }
    }

    let mut zero: Option<NodeId> = None;
    let entries: Vec<NodeId> = jac_entries
        .into_iter()
        .map(|e| e.unwrap_or_else(|| *zero.get_or_insert_with(|| b.constant(F::zero()))))
        .collect();
    b.output(m, n, &entries);
    b.finish()
}
