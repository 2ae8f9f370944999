//! Graph builder methods, one per operator.
//!
//! Every method appends an operator node and returns its id; no value is
//! computed until it is read. Hyper-parameters such as `alpha` are scalar
//! nodes, usually created with [`Graph::constant`].

use rand::Rng;

use crate::ag::function::{BinaryKind, Function, ParametricKind, ReductionKind, ScalarKind, UnaryKind};
use crate::ag::graph::{Graph, GraphMode};
use crate::ag::node::NodeId;
use crate::error::{fatal, GradError};
use crate::mat::Float;

macro_rules! unary_operators {
    ($($(#[$doc:meta])* $method:ident => $kind:ident,)*) => {
        $(
            $(#[$doc])*
            pub fn $method(&mut self, x: NodeId) -> NodeId {
                self.new_operator(Function::Unary(UnaryKind::$kind), vec![x])
            }
        )*
    };
}

macro_rules! binary_operators {
    ($($(#[$doc:meta])* $method:ident => $kind:ident,)*) => {
        $(
            $(#[$doc])*
            pub fn $method(&mut self, a: NodeId, b: NodeId) -> NodeId {
                self.new_operator(Function::Binary(BinaryKind::$kind), vec![a, b])
            }
        )*
    };
}

macro_rules! scalar_operators {
    ($($(#[$doc:meta])* $method:ident => $kind:ident,)*) => {
        $(
            $(#[$doc])*
            pub fn $method(&mut self, x: NodeId, s: NodeId) -> NodeId {
                self.new_operator(Function::Scalar(ScalarKind::$kind), vec![x, s])
            }
        )*
    };
}

impl<T: Float> Graph<T> {
    unary_operators! {
        tan => Tan,
        tanh => Tanh,
        sigmoid => Sigmoid,
        hard_sigmoid => HardSigmoid,
        hard_tanh => HardTanh,
        relu => ReLU,
        softsign => Softsign,
        cos => Cos,
        sin => Sin,
        exp => Exp,
        /// Natural logarithm. Zero becomes `ln(1e-8)`; reading the value of
        /// a node with a negative element is fatal.
        log => Log,
        neg => Neg,
        reciprocal => Reciprocal,
        abs => Abs,
        mish => Mish,
        gelu => GELU,
        sqrt => Sqrt,
        swish => Swish,
        square => Square,
    }

    binary_operators! {
        add => Add,
        sub => Sub,
        /// Elementwise product.
        prod => Prod,
        div => Div,
        /// Matrix product.
        mul => Mul,
        /// Inner product of two vectors of the same size, as a `1x1` node.
        dot => Dot,
        max => Max,
        min => Min,
    }

    scalar_operators! {
        add_scalar => AddScalar,
        sub_scalar => SubScalar,
        /// `s - x`
        reverse_sub_scalar => ReverseSubScalar,
        prod_scalar => ProdScalar,
        div_scalar => DivScalar,
    }

    fn parametric(&mut self, kind: ParametricKind, operands: Vec<NodeId>) -> NodeId {
        self.new_operator(Function::Parametric(kind), operands)
    }

    pub fn elu(&mut self, x: NodeId, alpha: NodeId) -> NodeId {
        self.parametric(ParametricKind::ELU, vec![x, alpha])
    }

    pub fn leaky_relu(&mut self, x: NodeId, alpha: NodeId) -> NodeId {
        self.parametric(ParametricKind::LeakyReLU, vec![x, alpha])
    }

    pub fn selu(&mut self, x: NodeId, alpha: NodeId, scale: NodeId) -> NodeId {
        self.parametric(ParametricKind::SELU, vec![x, alpha, scale])
    }

    pub fn celu(&mut self, x: NodeId, alpha: NodeId) -> NodeId {
        self.parametric(ParametricKind::CELU, vec![x, alpha])
    }

    pub fn softplus(&mut self, x: NodeId, beta: NodeId, threshold: NodeId) -> NodeId {
        self.parametric(ParametricKind::SoftPlus, vec![x, beta, threshold])
    }

    pub fn soft_shrink(&mut self, x: NodeId, lambda: NodeId) -> NodeId {
        self.parametric(ParametricKind::SoftShrink, vec![x, lambda])
    }

    /// `x` where `x > threshold`, `value` elsewhere.
    pub fn threshold(&mut self, x: NodeId, threshold: NodeId, value: NodeId) -> NodeId {
        self.parametric(ParametricKind::Threshold, vec![x, threshold, value])
    }

    /// Swish with a trainable `beta`.
    pub fn swish_b(&mut self, x: NodeId, beta: NodeId) -> NodeId {
        self.new_operator(Function::SwishB, vec![x, beta])
    }

    /// `x` raised to a constant power.
    pub fn pow(&mut self, x: NodeId, power: f64) -> NodeId {
        self.new_operator(Function::Pow { power }, vec![x])
    }

    pub fn reduce_sum(&mut self, x: NodeId) -> NodeId {
        self.new_operator(Function::Reduction(ReductionKind::ReduceSum), vec![x])
    }

    pub fn reduce_mean(&mut self, x: NodeId) -> NodeId {
        self.new_operator(Function::Reduction(ReductionKind::ReduceMean), vec![x])
    }

    pub fn reduce_max(&mut self, x: NodeId) -> NodeId {
        self.new_operator(Function::Reduction(ReductionKind::ReduceMax), vec![x])
    }

    pub fn softmax(&mut self, x: NodeId) -> NodeId {
        self.new_operator(Function::Reduction(ReductionKind::Softmax), vec![x])
    }

    pub fn transpose(&mut self, x: NodeId) -> NodeId {
        self.new_operator(Function::Transpose, vec![x])
    }

    pub fn reshape(&mut self, x: NodeId, rows: usize, cols: usize) -> NodeId {
        self.new_operator(Function::Reshape { rows, cols }, vec![x])
    }

    /// Element `(row, col)` as a `1x1` node.
    pub fn at(&mut self, x: NodeId, row: usize, col: usize) -> NodeId {
        self.new_operator(Function::At { row, col }, vec![x])
    }

    pub fn row_view(&mut self, x: NodeId, row: usize) -> NodeId {
        self.new_operator(Function::RowView { row }, vec![x])
    }

    pub fn col_view(&mut self, x: NodeId, col: usize) -> NodeId {
        self.new_operator(Function::ColView { col }, vec![x])
    }

    pub fn slice(&mut self, x: NodeId, row_start: usize, col_start: usize, row_end: usize, col_end: usize) -> NodeId {
        self.new_operator(
            Function::Slice {
                row_start,
                col_start,
                row_end,
                col_end,
            },
            vec![x],
        )
    }

    /// All elements of `xs` in a single column vector.
    pub fn concat(&mut self, xs: &[NodeId]) -> NodeId {
        self.new_operator(Function::Concat, xs.to_vec())
    }

    /// One row per operand. Operands must hold the same number of elements.
    pub fn stack(&mut self, xs: &[NodeId]) -> NodeId {
        self.new_operator(Function::Stack, xs.to_vec())
    }

    /// `x` followed by one extra row per vector in `vs`.
    pub fn append_rows(&mut self, x: NodeId, vs: &[NodeId]) -> NodeId {
        let mut operands = Vec::with_capacity(vs.len() + 1);
        operands.push(x);
        operands.extend_from_slice(vs);
        self.new_operator(Function::AppendRows, operands)
    }

    pub fn identity(&mut self, x: NodeId) -> NodeId {
        self.new_operator(Function::Identity, vec![x])
    }

    /// Zeroes each element with probability `p` and scales survivors by
    /// `1 / (1 - p)`. Returns `x` itself in inference mode or when `p` is 0.
    pub fn dropout(&mut self, x: NodeId, p: f64) -> NodeId {
        if !(0.0..1.0).contains(&p) {
            fatal(GradError::InvalidArgument {
                operation: "Dropout".to_string(),
                message: format!("probability must be in [0, 1), got {}", p),
            });
        }
        if self.mode() == GraphMode::Inference || p == 0.0 {
            return x;
        }
        let seed = self.rng.gen::<u64>();
        self.new_operator(Function::Dropout { p, seed }, vec![x])
    }

    // --- Composites ---

    /// `ELU(x, 1) + 1`
    pub fn positive_elu(&mut self, x: NodeId) -> NodeId {
        let one = self.constant(1.0);
        let elu = self.elu(x, one);
        let one = self.constant(1.0);
        self.add_scalar(elu, one)
    }

    /// `Log(Softmax(x))`
    pub fn log_softmax(&mut self, x: NodeId) -> NodeId {
        let softmax = self.softmax(x);
        self.log(softmax)
    }

    /// Elementwise sum of all `xs`.
    ///
    /// # Panics
    /// If `xs` is empty.
    pub fn sum(&mut self, xs: &[NodeId]) -> NodeId {
        let (&first, rest) = match xs.split_first() {
            Some(split) => split,
            None => fatal(GradError::EmptyOperands("Sum".to_string())),
        };
        rest.iter().fold(first, |acc, &x| self.add(acc, x))
    }

    /// Elementwise mean of all `xs`.
    ///
    /// # Panics
    /// If `xs` is empty.
    pub fn mean(&mut self, xs: &[NodeId]) -> NodeId {
        if xs.is_empty() {
            fatal(GradError::EmptyOperands("Mean".to_string()));
        }
        let sum = self.sum(xs);
        let n = self.constant(xs.len() as f64);
        self.div_scalar(sum, n)
    }
}
