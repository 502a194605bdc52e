//! Generic multi-input, multi-output differentiable functions.
//!
//! A [`Function`] couples a representation of a computation (plain
//! numeric closures, or a scalar expression graph) with buffered
//! storage for values and directional sensitivities. One evaluation
//! call propagates the nondifferentiated value together with any
//! number of simultaneous forward and adjoint seed directions; a
//! boolean analogue of the same sweep propagates dependency bits to
//! discover Jacobian sparsity without numeric work; and the derivative
//! builder composes these into Jacobian and Hessian objects that are
//! themselves ordinary function instances.
//!
//! ```
//! use gradfn::{Function, GraphBuilder};
//!
//! // f(x) = 2 x, scalar in, scalar out.
//! let mut b = GraphBuilder::new();
//! let x = b.input(1, 1);
//! let two = b.constant(2.0_f64);
//! let y = b.mul(two, x[0]);
//! b.output(1, 1, &[y]);
//!
//! let mut f = Function::new(b.finish());
//! f.set_num_directions(1, 1);
//! f.init().unwrap();
//!
//! f.set_input(0, &[3.0]).unwrap();
//! f.set_fwd_seed(0, 0, &[1.0]).unwrap();
//! f.set_adj_seed(0, 0, &[1.0]).unwrap();
//! f.evaluate(1, 1).unwrap();
//!
//! assert_eq!(f.output(0).unwrap().as_slice(), &[6.0]);
//! assert_eq!(f.fwd_sens(0, 0).unwrap().as_slice(), &[2.0]);
//! assert_eq!(f.adj_sens(0, 0).unwrap().as_slice(), &[2.0]);
//! ```

pub mod buffer;
pub mod derivative;
pub mod error;
pub mod float;
pub mod function;
pub mod graph;
pub mod numeric;
pub mod repr;
pub mod scheme;
pub mod slots;
pub mod solver;
pub mod sparsity;
pub mod sprop;

pub use buffer::Buffer;
pub use error::{Error, Result};
pub use float::Float;
pub use function::{Function, FunctionState};
pub use graph::{GraphBuilder, NodeId, ScalarGraph};
pub use numeric::NumericFn;
pub use repr::{Representation, ReprKind};
pub use scheme::IoScheme;
pub use slots::{SensMode, SlotKind, SlotStore};
pub use solver::{DenseLu, SparseSolver};
pub use sparsity::Sparsity;
