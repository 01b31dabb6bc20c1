//! Relational algebra over numeric matrices
//!
//! Every operation builds a fresh matrix (or a boolean scalar) from its
//! operands, delegating scalar construction to the factory. Cellwise
//! operations iterate only the non-zero supports; absent cells read as
//! zero throughout.

use std::collections::{BTreeMap, BTreeSet};

use super::{BoolValue, CmpOp, Dimensions, NumValue, NumericFactory, NumericMatrix};
use crate::config::QuantitativeType;
use crate::error::TranslationError;

/// The numeric side of a cell: binary pairs contribute their numeric half.
fn to_numeric(v: &NumValue) -> NumValue {
    match v {
        NumValue::Binary(b) => b.to_numeric().clone(),
        _ => v.clone(),
    }
}

/// The boolean side of a cell: binary pairs contribute their boolean half,
/// anything else drops through `v != 0`.
fn as_bool(f: &NumericFactory, v: &NumValue) -> BoolValue {
    match v {
        NumValue::Binary(b) => b.to_bool().clone(),
        _ => f.drop_value(v),
    }
}

/// Cellwise multiplication, specialized on the operand matrices' kinds:
/// boolean cells conjoin, mixed cells gate the numeric side, numeric cells
/// multiply.
fn hadamard(
    f: &NumericFactory,
    left_boolean: bool,
    right_boolean: bool,
    a: &NumValue,
    b: &NumValue,
) -> NumValue {
    if left_boolean && right_boolean {
        f.to_binary(&f.and(&as_bool(f, a), &as_bool(f, b)))
    } else if left_boolean {
        f.ite(&as_bool(f, a), &to_numeric(b), &NumValue::ZERO)
    } else if right_boolean {
        f.ite(&as_bool(f, b), &to_numeric(a), &NumValue::ZERO)
    } else {
        f.times(&to_numeric(a), &to_numeric(b))
    }
}

impl NumericMatrix {
    fn check_dims(&self, other: &NumericMatrix) {
        assert_eq!(
            self.dimensions(),
            other.dimensions(),
            "incompatible matrix dimensions"
        );
    }

    fn fuzzy(f: &NumericFactory) -> bool {
        f.factory_type() == QuantitativeType::Fuzzy
    }

    /// Clamps a scalar to at most one in the fuzzy domain.
    fn bound_one(f: &NumericFactory, v: NumValue) -> NumValue {
        if Self::fuzzy(f) {
            f.ite(&f.cmp(CmpOp::Gte, &v, &NumValue::ONE), &NumValue::ONE, &v)
        } else {
            v
        }
    }

    /// Cellwise addition, bounded at one in the fuzzy domain.
    pub fn plus(&self, other: &NumericMatrix, f: &NumericFactory) -> NumericMatrix {
        self.check_dims(other);
        let mut ret = NumericMatrix::empty(self.dimensions().clone(), false);

        for (i, a) in self.iter() {
            match other.cells().get(i) {
                Some(b) => {
                    let sum = f.plus(&to_numeric(a), &to_numeric(b));
                    ret.fast_set(i, Self::bound_one(f, sum));
                }
                None => ret.fast_set(i, to_numeric(a)),
            }
        }
        for (i, b) in other.iter() {
            if !self.cells().contains_index(i) {
                ret.fast_set(i, to_numeric(b));
            }
        }
        ret
    }

    /// Cellwise bounded subtraction: `max(0, A[i] - B[i])` where `A` is
    /// present, and `-B[i]` where it is absent.
    pub fn minus(&self, other: &NumericMatrix, f: &NumericFactory) -> NumericMatrix {
        self.check_dims(other);
        let mut ret = NumericMatrix::empty(self.dimensions().clone(), false);

        for (i, a) in self.iter() {
            match other.cells().get(i) {
                Some(b) => {
                    let r = f.minus(&to_numeric(a), &to_numeric(b));
                    let r = f.ite(&f.cmp(CmpOp::Lt, &r, &NumValue::ZERO), &NumValue::ZERO, &r);
                    ret.fast_set(i, r);
                }
                None => ret.fast_set(i, to_numeric(a)),
            }
        }
        for (i, b) in other.iter() {
            if !self.cells().contains_index(i) {
                ret.fast_set(i, f.negate(&to_numeric(b)));
            }
        }
        ret
    }

    /// Weighted difference: `A[i] != 0 => A[i] - tnorm(A[i], B[i])`.
    pub fn difference(
        &self,
        other: &NumericMatrix,
        f: &NumericFactory,
    ) -> Result<NumericMatrix, TranslationError> {
        self.check_dims(other);
        let both_boolean = self.is_boolean() && other.is_boolean();
        let mut ret = NumericMatrix::empty(self.dimensions().clone(), both_boolean);

        for (i, a) in self.iter() {
            match other.cells().get(i) {
                Some(b) => {
                    let r = if both_boolean {
                        let keeps = f.and(&as_bool(f, a), &f.not(&as_bool(f, b)));
                        f.to_binary(&keeps)
                    } else {
                        let n1 = to_numeric(a);
                        let n2 = to_numeric(b);
                        let removed = f.tnorm(&n1, &n2)?;
                        f.guard(&f.neq(&n1, &NumValue::ZERO), &f.minus(&n1, &removed))
                    };
                    ret.fast_set(i, r);
                }
                None => ret.fast_set(i, to_numeric(a)),
            }
        }
        Ok(ret)
    }

    /// Hadamard product.
    pub fn product(&self, other: &NumericMatrix, f: &NumericFactory) -> NumericMatrix {
        self.check_dims(other);
        let both_boolean = self.is_boolean() && other.is_boolean();
        let mut ret = NumericMatrix::empty(self.dimensions().clone(), both_boolean);

        for (i, a) in self.iter() {
            if let Some(b) = other.cells().get(i) {
                ret.fast_set(
                    i,
                    hadamard(f, self.is_boolean(), other.is_boolean(), a, b),
                );
            }
        }
        ret
    }

    /// Multiplies every cell by the given scalar.
    pub fn scale(&self, scalar: &NumValue, f: &NumericFactory) -> NumericMatrix {
        if scalar.is_one() {
            return self.clone();
        }
        let mut ret = NumericMatrix::empty(self.dimensions().clone(), false);
        if scalar.is_zero() {
            return ret;
        }
        for (i, a) in self.iter() {
            ret.fast_set(i, f.times(&to_numeric(a), scalar));
        }
        ret
    }

    /// Hadamard division, bounded at one in the fuzzy domain. Division by
    /// an absent (constantly zero) cell is flagged here; variable
    /// denominators defer to the division-by-zero guard.
    pub fn divide(
        &self,
        other: &NumericMatrix,
        f: &NumericFactory,
    ) -> Result<NumericMatrix, TranslationError> {
        self.check_dims(other);
        let mut ret = NumericMatrix::empty(self.dimensions().clone(), false);

        for (i, a) in self.iter() {
            match other.cells().get(i) {
                Some(b) => {
                    let div = f.divide(&to_numeric(a), &to_numeric(b))?;
                    ret.fast_set(i, Self::bound_one(f, div));
                }
                None => {
                    return Err(TranslationError::Arithmetic(
                        "division by a zero cell".to_string(),
                    ))
                }
            }
        }
        Ok(ret)
    }

    /// Cellwise modulo; modulo by an absent (zero) cell is a fault.
    pub fn modulo(
        &self,
        other: &NumericMatrix,
        f: &NumericFactory,
    ) -> Result<NumericMatrix, TranslationError> {
        self.check_dims(other);
        let mut ret = NumericMatrix::empty(self.dimensions().clone(), false);

        for (i, a) in self.iter() {
            match other.cells().get(i) {
                Some(b) => {
                    let r = f.modulo(&to_numeric(a), &to_numeric(b))?;
                    ret.fast_set(i, r);
                }
                None => {
                    return Err(TranslationError::Arithmetic(
                        "modulo by a zero cell".to_string(),
                    ))
                }
            }
        }
        Ok(ret)
    }

    /// Intersection: cellwise t-norm.
    pub fn intersection(
        &self,
        other: &NumericMatrix,
        f: &NumericFactory,
    ) -> Result<NumericMatrix, TranslationError> {
        self.check_dims(other);
        let both_boolean = self.is_boolean() && other.is_boolean();
        let mut ret = NumericMatrix::empty(self.dimensions().clone(), both_boolean);

        if self.cells().is_empty() || other.cells().is_empty() {
            return Ok(ret);
        }
        for (i, a) in self.iter() {
            if let Some(b) = other.cells().get(i) {
                let r = if both_boolean {
                    f.to_binary(&f.and(&as_bool(f, a), &as_bool(f, b)))
                } else {
                    f.tnorm(&to_numeric(a), &to_numeric(b))?
                };
                ret.fast_set(i, r);
            }
        }
        Ok(ret)
    }

    /// Union: cellwise t-conorm.
    pub fn union(
        &self,
        other: &NumericMatrix,
        f: &NumericFactory,
    ) -> Result<NumericMatrix, TranslationError> {
        self.check_dims(other);
        let both_boolean = self.is_boolean() && other.is_boolean();
        let mut ret = NumericMatrix::empty(self.dimensions().clone(), both_boolean);

        for (i, a) in self.iter() {
            match other.cells().get(i) {
                Some(b) => {
                    let r = if both_boolean {
                        f.to_binary(&f.or(&as_bool(f, a), &as_bool(f, b)))
                    } else {
                        f.tconorm(&to_numeric(a), &to_numeric(b))?
                    };
                    ret.fast_set(i, r);
                }
                None => ret.fast_set(i, a.clone()),
            }
        }
        for (i, b) in other.iter() {
            if !self.cells().contains_index(i) {
                ret.fast_set(i, to_numeric(b));
            }
        }
        Ok(ret)
    }

    /// Intersection gated on this matrix's non-zero support: where both
    /// sides are non-zero, the larger value; elsewhere zero.
    pub fn left_intersection(&self, other: &NumericMatrix, f: &NumericFactory) -> NumericMatrix {
        self.check_dims(other);
        let mut ret = NumericMatrix::empty(self.dimensions().clone(), false);

        if self.cells().is_empty() || other.cells().is_empty() {
            return ret;
        }
        for (i, a) in self.iter() {
            if let Some(b) = other.cells().get(i) {
                let a = to_numeric(a);
                let b = to_numeric(b);
                let non_zero = f.and(&f.neq(&a, &NumValue::ZERO), &f.neq(&b, &NumValue::ZERO));
                if !non_zero.is_false() {
                    ret.fast_set(i, f.ite(&non_zero, &f.maximum(&a, &b), &NumValue::ZERO));
                }
            }
        }
        ret
    }

    /// Intersection gated on the other matrix's non-zero support.
    pub fn right_intersection(&self, other: &NumericMatrix, f: &NumericFactory) -> NumericMatrix {
        other.left_intersection(self, f)
    }

    /// Restricts to rows whose first coordinate occurs in the given vector.
    pub fn domain(&self, vector: &NumericMatrix, f: &NumericFactory) -> NumericMatrix {
        assert_eq!(
            vector.dimensions().num_dimensions(),
            1,
            "the restricting matrix must be a vector"
        );
        let mut ret = NumericMatrix::empty(self.dimensions().clone(), self.is_boolean());
        if self.cells().is_empty() || vector.cells().is_empty() {
            return ret;
        }

        let row_size = self.dimensions().capacity() / self.dimensions().dimension(0);
        for (r, occurs) in vector.iter() {
            let occurrence = as_bool(f, occurs);
            for p in 0..row_size {
                let i = r * row_size + p;
                if let Some(cell) = self.cells().get(i) {
                    ret.set(i, f.guard(&occurrence, &to_numeric(cell)));
                }
            }
        }
        ret
    }

    /// Restricts to cells whose last coordinate occurs in the given vector.
    pub fn range(&self, vector: &NumericMatrix, f: &NumericFactory) -> NumericMatrix {
        assert_eq!(
            vector.dimensions().num_dimensions(),
            1,
            "the restricting matrix must be a vector"
        );
        let mut ret = NumericMatrix::empty(self.dimensions().clone(), self.is_boolean());
        if self.cells().is_empty() || vector.cells().is_empty() {
            return ret;
        }

        let cap = self.dimensions().capacity();
        let last = self
            .dimensions()
            .dimension(self.dimensions().num_dimensions() - 1);
        for (c, occurs) in vector.iter() {
            let occurrence = as_bool(f, occurs);
            let mut i = c;
            while i < cap {
                if let Some(cell) = self.cells().get(i) {
                    ret.set(i, f.guard(&occurrence, &to_numeric(cell)));
                }
                i += last;
            }
        }
        ret
    }

    /// Cross (Kronecker) product. In the fuzzy domain combined cells take
    /// the t-norm; elsewhere the standard product.
    pub fn cross(
        &self,
        other: &NumericMatrix,
        f: &NumericFactory,
    ) -> Result<NumericMatrix, TranslationError> {
        let dims = self.dimensions().cross(other.dimensions());
        let both_boolean = self.is_boolean() && other.is_boolean();
        let mut ret = NumericMatrix::empty(dims, both_boolean);

        if self.cells().is_empty() || other.cells().is_empty() {
            return Ok(ret);
        }
        let ocap = other.dimensions().capacity();
        for (i, a) in self.iter() {
            let base = ocap * i;
            for (j, b) in other.iter() {
                let value = if Self::fuzzy(f) {
                    f.tnorm(&to_numeric(a), &to_numeric(b))?
                } else {
                    hadamard(f, self.is_boolean(), other.is_boolean(), a, b)
                };
                if !value.is_zero() {
                    ret.fast_set(base + j, value);
                }
            }
        }
        Ok(ret)
    }

    /// The join–meet matrix product: `(AB)[i,k] = join_j meet(A[i,j], B[j,k])`.
    pub fn dot(
        &self,
        other: &NumericMatrix,
        f: &NumericFactory,
    ) -> Result<NumericMatrix, TranslationError> {
        let dims = self.dimensions().dot(other.dimensions());
        let both_boolean = self.is_boolean() && other.is_boolean();
        let mut ret = NumericMatrix::empty(dims, both_boolean);

        if self.cells().is_empty() || other.cells().is_empty() {
            return Ok(ret);
        }

        let b = other.dimensions().dimension(0);
        let c = other.dimensions().capacity() / b;

        for (i, a) in self.iter() {
            let row_head = (i % b) * c;
            let row_tail = row_head + c - 1;
            for (j, bv) in other.cells().iter_range(row_head, row_tail) {
                let value = if both_boolean {
                    f.to_binary(&f.and(&as_bool(f, a), &as_bool(f, bv)))
                } else {
                    f.meet(&to_numeric(a), &to_numeric(bv))?
                };
                if value.is_zero() {
                    continue;
                }
                let k = (i / b) * c + j % c;
                let current = ret.fast_get(k);
                let merged = if current.is_zero() {
                    value
                } else if both_boolean {
                    f.to_binary(&f.or(&as_bool(f, &current), &as_bool(f, &value)))
                } else {
                    f.join(&to_numeric(&current), &to_numeric(&value))?
                };
                ret.fast_set(k, merged);
            }
        }
        Ok(ret)
    }

    /// The plus–times matrix product.
    pub fn multi_dot(&self, other: &NumericMatrix, f: &NumericFactory) -> NumericMatrix {
        let dims = self.dimensions().dot(other.dimensions());
        let mut ret = NumericMatrix::empty(dims, false);

        if self.cells().is_empty() || other.cells().is_empty() {
            return ret;
        }

        let b = other.dimensions().dimension(0);
        let c = other.dimensions().capacity() / b;
        let mut sums: BTreeMap<usize, Vec<NumValue>> = BTreeMap::new();

        for (i, a) in self.iter() {
            let row_head = (i % b) * c;
            let row_tail = row_head + c - 1;
            for (j, bv) in other.cells().iter_range(row_head, row_tail) {
                let value = hadamard(f, self.is_boolean(), other.is_boolean(), a, bv);
                if !value.is_zero() {
                    let k = (i / b) * c + j % c;
                    sums.entry(k).or_default().push(to_numeric(&value));
                }
            }
        }
        for (k, values) in sums {
            ret.fast_set(k, f.plus_all(values));
        }
        ret
    }

    /// Transposes a two-dimensional matrix.
    pub fn transpose(&self) -> NumericMatrix {
        let mut ret = NumericMatrix::empty(self.dimensions().transpose(), self.is_boolean());
        let rows = self.dimensions().dimension(0);
        let cols = self.dimensions().dimension(1);
        for (i, v) in self.iter() {
            ret.fast_set((i % cols) * rows + i / cols, v.clone());
        }
        ret
    }

    /// Transitive closure by iterated squaring, up to the number of rows
    /// with a non-zero entry.
    pub fn closure(&self, f: &NumericFactory) -> Result<NumericMatrix, TranslationError> {
        assert!(
            self.dimensions().num_dimensions() == 2 && self.dimensions().is_square(),
            "closure requires a square binary matrix"
        );
        if self.cells().is_empty() {
            return Ok(self.clone());
        }

        let row_factor = self.dimensions().dimension(1);
        let occupied_rows: BTreeSet<usize> = self.iter().map(|(i, _)| i / row_factor).collect();
        let row_num = occupied_rows.len();

        let mut ret = self.clone();
        let mut i = 1;
        while i < row_num {
            ret = ret.union(&ret.dot(&ret, f)?, f)?;
            i *= 2;
        }
        Ok(ret)
    }

    /// Reflexive transitive closure by divide and conquer into block
    /// matrices. The structural result is accompanied by fixed-point
    /// equations, appended to `fp_eq`, asserting `X = id + A.X`; the solver
    /// finalizes the fixed point.
    pub fn reflexive_closure(
        &self,
        f: &NumericFactory,
        fp_eq: &mut Vec<BoolValue>,
    ) -> Result<NumericMatrix, TranslationError> {
        assert!(
            self.dimensions().num_dimensions() == 2 && self.dimensions().is_square(),
            "reflexive closure requires a square binary matrix"
        );

        let n = self.dimensions().dimension(0);
        let mut ret = NumericMatrix::empty(self.dimensions().clone(), false);

        if self.cells().is_empty() {
            // *0 = id
            for i in 0..n {
                ret.set(i * n + i, NumValue::ONE);
            }
            return Ok(ret);
        }
        if n == 1 {
            ret.fast_set(0, f.maximum(&self.fast_get(0), &NumValue::ONE));
            return Ok(ret);
        }

        let m = if n % 2 == 0 { n / 2 } else { n / 2 + 1 };
        let p = n - m;

        let mut a11 = NumericMatrix::empty(Dimensions::square(m, 2), false);
        let mut a22 = NumericMatrix::empty(Dimensions::square(p, 2), false);
        let mut a12 = NumericMatrix::empty(Dimensions::rectangular(vec![m, p]), false);
        let mut a21 = NumericMatrix::empty(Dimensions::rectangular(vec![p, m]), false);

        for (i, v) in self.entries() {
            let col = i % n;
            let row = i / n;
            if col < m && row < m {
                a11.set(m * row + col, v);
            } else if col >= m && row >= m {
                a22.set(p * (row - m) + col - m, v);
            } else if col < m {
                a21.set((row - m) * m + col, v);
            } else {
                a12.set(row * p + col - m, v);
            }
        }

        let a11star = a11.reflexive_closure(f, fp_eq)?;
        let a22star = a22.reflexive_closure(f, fp_eq)?;

        // x11 = *(a11 + a12.*a22.a21)
        let x11 = a11
            .union(&a12.dot(&a22star, f)?.dot(&a21, f)?, f)?
            .reflexive_closure(f, fp_eq)?;
        // x22 = *(a22 + a21.*a11.a12)
        let x22 = a22
            .union(&a21.dot(&a11star, f)?.dot(&a12, f)?, f)?
            .reflexive_closure(f, fp_eq)?;
        // x12 = x11.a12.*a22
        let x12 = x11.dot(&a12, f)?.dot(&a22star, f)?;
        // x21 = x22.a21.*a11
        let x21 = x22.dot(&a21, f)?.dot(&a11star, f)?;

        Self::assign_block(&mut ret, n, m, Block::TopLeft, &x11);
        Self::assign_block(&mut ret, n, m, Block::BottomRight, &x22);
        Self::assign_block(&mut ret, n, m, Block::TopRight, &x12);
        Self::assign_block(&mut ret, n, m, Block::BottomLeft, &x21);

        // *a11.a12.x22 = x11.a12.*a22
        fp_eq.push(x12.eq(&a11star.dot(&a12, f)?.dot(&x22, f)?, f));
        // *a22.a21.x11 = x22.a21.*a11
        fp_eq.push(x21.eq(&a22star.dot(&a21, f)?.dot(&x11, f)?, f));

        // ret = id + this . ret
        let mut id = NumericMatrix::empty(Dimensions::square(n, 2), false);
        for i in 0..n {
            id.set(i * n + i, NumValue::ONE);
        }
        fp_eq.push(ret.eq(&id.union(&self.dot(&ret, f)?, f)?, f));

        Ok(ret)
    }

    fn assign_block(ret: &mut NumericMatrix, n: usize, m: usize, block: Block, a: &NumericMatrix) {
        let row_size = a.dimensions().capacity() / a.dimensions().dimension(0);
        let cols = a.dimensions().dimension(1);
        for (i, v) in a.entries() {
            let row = i / row_size;
            let col = i % cols;
            let index = match block {
                Block::TopLeft => n * row + col,
                Block::BottomLeft => n * (m + row) + col,
                Block::TopRight => row * n + m + col,
                Block::BottomRight => n * (m + row) + m + col,
            };
            ret.set(index, v);
        }
    }

    /// Row-wise override: for each row, the other matrix's row wins unless
    /// it is entirely zero.
    pub fn override_with(&self, other: &NumericMatrix, f: &NumericFactory) -> NumericMatrix {
        self.check_dims(other);
        if other.cells().is_empty() {
            return self.clone();
        }

        let both_boolean = self.is_boolean() && other.is_boolean();
        let mut ret = NumericMatrix::empty(self.dimensions().clone(), both_boolean);
        ret.cells_mut().put_all(other.cells());

        let row_length = self.dimensions().capacity() / self.dimensions().dimension(0);
        let mut row = usize::MAX;
        let mut row_non_zero = BoolValue::FALSE;

        for (i, a) in self.iter() {
            let a_row = i / row_length;
            if row != a_row {
                row = a_row;
                let row_cells: Vec<BoolValue> = other
                    .cells()
                    .iter_range(row * row_length, (row + 1) * row_length - 1)
                    .map(|(_, v)| as_bool(f, v))
                    .collect();
                row_non_zero = f.or_all(row_cells);
            }

            if row_non_zero.is_false() {
                ret.fast_set(i, a.clone());
            } else {
                let overriding = ret.fast_get(i);
                let kept = if both_boolean {
                    f.to_binary(&f.ite_bool(
                        &row_non_zero,
                        &as_bool(f, &overriding),
                        &as_bool(f, a),
                    ))
                } else {
                    f.ite(&row_non_zero, &to_numeric(&overriding), &to_numeric(a))
                };
                ret.fast_set(i, kept);
            }
        }
        ret
    }

    /// Projection onto the given scalar-valued columns. A column scalar
    /// selects a dimension of this matrix; non-constant columns iterate the
    /// possible selections under a guard formula.
    pub fn project(&self, columns: &[NumValue], f: &NumericFactory) -> NumericMatrix {
        assert!(self.dimensions().is_square(), "projection requires a square matrix");
        assert!(!columns.is_empty(), "projection needs at least one column");

        let rdnum = columns.len();
        let tdnum = self.dimensions().num_dimensions();
        let rdims = Dimensions::square(self.dimensions().dimension(0), rdnum);
        let mut ret = NumericMatrix::empty(rdims.clone(), false);

        let mut fixed: Vec<Option<usize>> = Vec::with_capacity(rdnum);
        for column in columns {
            match column.as_number() {
                Some(value) => {
                    let v = value.as_f64();
                    if v < 0.0 || v >= tdnum as f64 {
                        return ret; // out-of-range constant selects nothing
                    }
                    fixed.push(Some(v as usize));
                }
                None => fixed.push(None),
            }
        }
        let var_cols: Vec<usize> = (0..rdnum).filter(|&j| fixed[j].is_none()).collect();

        let mut assignment = vec![0usize; var_cols.len()];
        let mut tvector = vec![0usize; tdnum];
        let mut rvector = vec![0usize; rdnum];

        loop {
            let mut col_val = BoolValue::TRUE;
            for (k, &j) in var_cols.iter().enumerate() {
                let selected = f.eq(&columns[j], &f.int_constant(assignment[k] as i64));
                col_val = f.and(&col_val, &selected);
                if col_val.is_false() {
                    break;
                }
            }

            if !col_val.is_false() {
                for (index, value) in self.entries() {
                    self.dimensions().convert(index, &mut tvector);
                    for j in 0..rdnum {
                        let dim = match fixed[j] {
                            Some(d) => d,
                            None => {
                                let k = var_cols.iter().position(|&c| c == j).unwrap();
                                assignment[k]
                            }
                        };
                        rvector[j] = tvector[dim];
                    }
                    let rindex = rdims.index_of(&rvector);
                    let keep = f.and(&as_bool(f, &value), &col_val);
                    let current = ret.fast_get(rindex);
                    ret.fast_set(rindex, f.ite(&keep, &to_numeric(&value), &current));
                }
            }

            // advance the selection odometer over the non-constant columns
            let mut done = true;
            for k in (0..assignment.len()).rev() {
                if assignment[k] + 1 < tdnum {
                    assignment[k] += 1;
                    done = false;
                    break;
                }
                assignment[k] = 0;
            }
            if done {
                break;
            }
        }
        ret
    }

    /// Khatri–Rao product of two square matrices over the same side size.
    pub fn khatri_rao(&self, other: &NumericMatrix, f: &NumericFactory) -> NumericMatrix {
        assert!(
            self.dimensions().is_square()
                && other.dimensions().is_square()
                && self.dimensions().dimension(0) == other.dimensions().dimension(0),
            "Khatri-Rao requires square matrices over the same side size"
        );

        let u = self.dimensions().dimension(0);
        let n = other.dimensions().num_dimensions() - 1;
        let m = self.dimensions().num_dimensions() - 1;

        let mut ret = NumericMatrix::empty(Dimensions::square(u, m + n + 1), false);
        if self.cells().is_empty() || other.cells().is_empty() {
            return ret;
        }

        let un = u.pow(n as u32);
        for (i0, a) in self.iter() {
            let shared = i0 % u;
            for (i1, b) in other.iter() {
                // the shared trailing/leading column must agree
                if i1 % u == shared {
                    let index = i0 * un + i1 - shared * un;
                    ret.set(index, f.times(&to_numeric(a), &to_numeric(b)));
                }
            }
        }
        ret
    }

    /// Cellwise choice: this matrix where the condition holds, the other
    /// matrix otherwise.
    pub fn choice(
        &self,
        condition: &BoolValue,
        other: &NumericMatrix,
        f: &NumericFactory,
    ) -> NumericMatrix {
        self.check_dims(other);
        if condition.is_true() {
            return self.clone();
        }
        if condition.is_false() {
            return other.clone();
        }

        let both_boolean = self.is_boolean() && other.is_boolean();
        let mut ret = NumericMatrix::empty(self.dimensions().clone(), both_boolean);

        for (i, a) in self.iter() {
            match other.cells().get(i) {
                Some(b) => ret.fast_set(i, f.ite(condition, &to_numeric(a), &to_numeric(b))),
                None => ret.fast_set(i, f.guard(condition, &to_numeric(a))),
            }
        }
        for (i, b) in other.iter() {
            if !self.cells().contains_index(i) {
                ret.fast_set(i, f.guard(&f.not(condition), &to_numeric(b)));
            }
        }
        ret
    }

    /// Alpha-cut: the boolean matrix of cells whose value reaches `alpha`.
    pub fn alpha_cut(&self, alpha: &NumValue, f: &NumericFactory) -> NumericMatrix {
        if self.is_boolean() {
            return self.clone();
        }
        let mut ret = NumericMatrix::empty(self.dimensions().clone(), true);
        for (i, v) in self.iter() {
            let cut = f.gte(&to_numeric(v), alpha);
            if !cut.is_false() {
                ret.fast_set(i, f.to_binary(&cut));
            }
        }
        ret
    }

    /// This matrix seen from the boolean point of view in a numeric
    /// context: each cell becomes `A[i] != 0`.
    pub fn drop(&self, f: &NumericFactory) -> NumericMatrix {
        if self.is_boolean() {
            return self.clone();
        }
        let mut ret = NumericMatrix::empty(self.dimensions().clone(), true);
        for (i, v) in self.iter() {
            ret.fast_set(i, f.to_binary(&f.drop_value(v)));
        }
        ret
    }

    /// The accumulated sum of all cells, broadcast as a constant matrix
    /// over the full capacity.
    pub fn cardinality(&self, f: &NumericFactory) -> NumericMatrix {
        let total = f.plus_all(self.iter().map(|(_, v)| to_numeric(v)).collect());
        let indices: Vec<usize> = (0..self.dimensions().capacity()).collect();
        NumericMatrix::homogeneous(self.dimensions().clone(), indices, total)
    }

    /// Alias of [`NumericMatrix::cardinality`]: the sum of all cells.
    pub fn sum(&self, f: &NumericFactory) -> NumericMatrix {
        self.cardinality(f)
    }

    /// `exists i. A[i] != 0`
    pub fn some(&self, f: &NumericFactory) -> BoolValue {
        if self.cells().is_empty() {
            return BoolValue::FALSE;
        }
        let occurrences: Vec<BoolValue> = self.iter().map(|(_, v)| as_bool(f, v)).collect();
        f.or_all(occurrences)
    }

    /// `forall i. A[i] = 0`
    pub fn none(&self, f: &NumericFactory) -> BoolValue {
        if self.cells().is_empty() {
            return BoolValue::TRUE;
        }
        if self.is_boolean() {
            let occurrences: Vec<BoolValue> = self.iter().map(|(_, v)| as_bool(f, v)).collect();
            f.nand_all(occurrences)
        } else {
            f.eq(&self.cardinality(f).get_first(), &NumValue::ZERO)
        }
    }

    /// Exactly one cell of the boolean support holds.
    pub fn one(&self, f: &NumericFactory) -> BoolValue {
        f.eq(&self.drop(f).cardinality(f).get_first(), &NumValue::ONE)
    }

    /// At most one cell of the boolean support holds.
    pub fn lone(&self, f: &NumericFactory) -> BoolValue {
        f.lte(&self.drop(f).cardinality(f).get_first(), &NumValue::ONE)
    }

    /// Weighted inclusion:
    /// `forall i. A[i] != 0 => B[i] != 0 && A[i] <= B[i]`.
    pub fn subset(&self, other: &NumericMatrix, f: &NumericFactory) -> BoolValue {
        self.check_dims(other);
        let both_boolean = self.is_boolean() && other.is_boolean();

        let mut conditions = Vec::with_capacity(self.density());
        for (i, a) in self.iter() {
            let b = other.fast_get(i);
            let included = if both_boolean {
                f.or(&f.not(&as_bool(f, a)), &as_bool(f, &b))
            } else {
                let n0 = to_numeric(a);
                let n1 = to_numeric(&b);
                f.implies(
                    &f.neq(&n0, &NumValue::ZERO),
                    &f.and(&f.neq(&n1, &NumValue::ZERO), &f.lte(&n0, &n1)),
                )
            };
            if included.is_false() {
                return BoolValue::FALSE;
            }
            conditions.push(included);
        }
        f.and_all(conditions)
    }

    /// Cellwise equality over the union of the supports.
    pub fn eq(&self, other: &NumericMatrix, f: &NumericFactory) -> BoolValue {
        self.check_dims(other);
        f.cmp_cells(CmpOp::Eq, self.cells(), other.cells())
    }

    /// Cellwise strictly-less with at least one strict cell.
    pub fn lt(&self, other: &NumericMatrix, f: &NumericFactory) -> BoolValue {
        self.check_dims(other);
        f.cmp_cells(CmpOp::Lt, self.cells(), other.cells())
    }

    /// Cellwise less-or-equal.
    pub fn lte(&self, other: &NumericMatrix, f: &NumericFactory) -> BoolValue {
        self.check_dims(other);
        f.cmp_cells(CmpOp::Lte, self.cells(), other.cells())
    }

    /// Cellwise strictly-greater with at least one strict cell.
    pub fn gt(&self, other: &NumericMatrix, f: &NumericFactory) -> BoolValue {
        self.check_dims(other);
        f.cmp_cells(CmpOp::Gt, self.cells(), other.cells())
    }

    /// Cellwise greater-or-equal.
    pub fn gte(&self, other: &NumericMatrix, f: &NumericFactory) -> BoolValue {
        self.check_dims(other);
        f.cmp_cells(CmpOp::Gte, self.cells(), other.cells())
    }

    /// Cellwise negation.
    pub fn negate(&self, f: &NumericFactory) -> NumericMatrix {
        if self.cells().is_homogeneous() {
            return NumericMatrix::homogeneous(
                self.dimensions().clone(),
                self.dense_indices(),
                f.negate(&self.get_first()),
            );
        }
        let mut ret = NumericMatrix::empty(self.dimensions().clone(), false);
        for (i, v) in self.iter() {
            ret.cells_mut().put(i, f.negate(&to_numeric(v)));
        }
        ret
    }

    /// Cellwise absolute value.
    pub fn abs(&self, f: &NumericFactory) -> NumericMatrix {
        if self.cells().is_homogeneous() {
            return NumericMatrix::homogeneous(
                self.dimensions().clone(),
                self.dense_indices(),
                f.abs(&self.get_first()),
            );
        }
        let mut ret = NumericMatrix::empty(self.dimensions().clone(), false);
        for (i, v) in self.iter() {
            ret.cells_mut().put(i, f.abs(&to_numeric(v)));
        }
        ret
    }

    /// Cellwise sign.
    pub fn signum(&self, f: &NumericFactory) -> NumericMatrix {
        if self.cells().is_homogeneous() {
            return NumericMatrix::homogeneous(
                self.dimensions().clone(),
                self.dense_indices(),
                f.signum(&self.get_first()),
            );
        }
        let mut ret = NumericMatrix::empty(self.dimensions().clone(), false);
        for (i, v) in self.iter() {
            let s = f.signum(&to_numeric(v));
            if !s.is_zero() {
                ret.cells_mut().put(i, s);
            }
        }
        ret
    }
}

#[derive(Clone, Copy)]
enum Block {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Options, Tnorm};
    use crate::num::Number;

    fn fuzzy_factory() -> NumericFactory {
        NumericFactory::new(&Options::fuzzy(Tnorm::Godelian))
    }

    fn integer_factory() -> NumericFactory {
        NumericFactory::new(&Options::integer())
    }

    fn constant_matrix(f: &NumericFactory, dims: Dimensions, cells: &[(usize, f64)]) -> NumericMatrix {
        let mut m = NumericMatrix::empty(dims, false);
        for &(i, w) in cells {
            m.set(i, f.constant(Number::Real(w)));
        }
        m
    }

    fn weight(m: &NumericMatrix, i: usize) -> f64 {
        m.get(i).as_number().map(|n| n.as_f64()).unwrap_or(f64::NAN)
    }

    #[test]
    fn union_takes_the_tconorm() {
        let f = fuzzy_factory();
        let d = Dimensions::square(3, 1);
        let a = constant_matrix(&f, d.clone(), &[(0, 0.3), (1, 0.8)]);
        let b = constant_matrix(&f, d, &[(1, 0.5), (2, 0.2)]);

        let u = a.union(&b, &f).unwrap();
        assert_eq!(weight(&u, 0), 0.3);
        assert_eq!(weight(&u, 1), 0.8);
        assert_eq!(weight(&u, 2), 0.2);
    }

    #[test]
    fn intersection_takes_the_tnorm() {
        let f = fuzzy_factory();
        let d = Dimensions::square(3, 1);
        let a = constant_matrix(&f, d.clone(), &[(0, 0.3), (1, 0.8)]);
        let b = constant_matrix(&f, d, &[(1, 0.5), (2, 0.2)]);

        let i = a.intersection(&b, &f).unwrap();
        assert!(i.get(0).is_zero());
        assert_eq!(weight(&i, 1), 0.5);
        assert!(i.get(2).is_zero());
    }

    #[test]
    fn plus_is_bounded_in_the_fuzzy_domain() {
        let f = fuzzy_factory();
        let d = Dimensions::square(2, 1);
        let a = constant_matrix(&f, d.clone(), &[(0, 0.6)]);
        let b = constant_matrix(&f, d, &[(0, 0.7)]);
        assert_eq!(weight(&a.plus(&b, &f), 0), 1.0);
    }

    #[test]
    fn plus_accumulates_in_the_integer_domain() {
        let f = integer_factory();
        let d = Dimensions::square(2, 1);
        let mut a = NumericMatrix::empty(d.clone(), false);
        a.set(0, f.int_constant(2));
        let mut b = NumericMatrix::empty(d, false);
        b.set(0, f.int_constant(3));
        assert_eq!(a.plus(&b, &f).get(0).as_number(), Some(Number::Int(5)));
    }

    #[test]
    fn minus_bounds_at_zero_and_negates_absent_rows() {
        let f = integer_factory();
        let d = Dimensions::square(2, 1);
        let mut a = NumericMatrix::empty(d.clone(), false);
        a.set(0, f.int_constant(2));
        let mut b = NumericMatrix::empty(d, false);
        b.set(0, f.int_constant(5));
        b.set(1, f.int_constant(4));

        let m = a.minus(&b, &f);
        assert!(m.get(0).is_zero()); // max(0, 2 - 5)
        assert_eq!(m.get(1).as_number(), Some(Number::Int(-4)));
    }

    #[test]
    fn transpose_round_trips() {
        let f = fuzzy_factory();
        let d = Dimensions::square(2, 2);
        let a = constant_matrix(&f, d, &[(1, 0.4), (2, 0.9)]);
        let back = a.transpose().transpose();
        assert_eq!(weight(&back, 1), 0.4);
        assert_eq!(weight(&back, 2), 0.9);
        assert_eq!(back.density(), a.density());
    }

    #[test]
    fn dot_is_the_join_meet_product() {
        // Sanchez-style composition: symptom vector . expert matrix
        let f = fuzzy_factory();
        let matrix = constant_matrix(
            &f,
            Dimensions::square(3, 2),
            // rows: symptoms 0..2, columns: diagnoses 0..2
            &[(0, 0.9), (1, 0.2), (3, 0.4), (4, 0.8), (6, 0.1), (7, 0.6)],
        );
        let vector = constant_matrix(&f, Dimensions::square(3, 1), &[(0, 0.8), (1, 0.6), (2, 0.4)]);

        let composed = vector.dot(&matrix, &f).unwrap();
        // diagnosis 0: max(min(.8,.9), min(.6,.4), min(.4,.1)) = 0.8
        assert_eq!(weight(&composed, 0), 0.8);
        // diagnosis 1: max(min(.8,.2), min(.6,.8), min(.4,.6)) = 0.6
        assert_eq!(weight(&composed, 1), 0.6);
    }

    #[test]
    fn closure_chains_edges_under_godel() {
        let f = fuzzy_factory();
        // a -> b at 0.3, b -> c at 0.4 over a 3-atom universe
        let a = constant_matrix(&f, Dimensions::square(3, 2), &[(1, 0.3), (5, 0.4)]);
        let closed = a.closure(&f).unwrap();
        assert_eq!(weight(&closed, 1), 0.3);
        assert_eq!(weight(&closed, 5), 0.4);
        // a -> c picks up min(0.3, 0.4)
        assert_eq!(weight(&closed, 2), 0.3);
    }

    #[test]
    fn closure_support_is_monotone() {
        let f = integer_factory();
        let mut a = NumericMatrix::empty(Dimensions::square(3, 2), false);
        a.set(1, f.int_constant(2));
        a.set(5, f.int_constant(7));
        let closed = a.closure(&f).unwrap();
        for i in a.dense_indices() {
            assert!(!closed.get(i).is_zero());
        }
    }

    #[test]
    fn reflexive_closure_contains_the_identity() {
        let f = fuzzy_factory();
        let a = constant_matrix(&f, Dimensions::square(3, 2), &[(1, 0.3)]);
        let mut fp_eq = Vec::new();
        let star = a.reflexive_closure(&f, &mut fp_eq).unwrap();
        for i in 0..3 {
            assert!(!star.get(i * 3 + i).is_zero(), "missing diagonal at {}", i);
        }
        assert!(!fp_eq.is_empty());
    }

    #[test]
    fn cardinality_is_the_fuzzy_sum() {
        let f = fuzzy_factory();
        let a = constant_matrix(&f, Dimensions::square(3, 1), &[(0, 0.5), (1, 0.2)]);
        let card = a.cardinality(&f);
        let total = card.get_first().as_number().unwrap().as_f64();
        assert!((total - 0.7).abs() < 1e-12);
        // broadcast to every cell
        assert_eq!(card.get(2).as_number(), card.get(0).as_number());
    }

    #[test]
    fn drop_then_cardinality_counts_tuples() {
        let f = integer_factory();
        let mut a = NumericMatrix::empty(Dimensions::square(3, 1), false);
        a.set(0, f.int_constant(5));
        a.set(1, f.int_constant(2));
        let count = a.drop(&f).cardinality(&f).get_first();
        assert_eq!(count.as_number(), Some(Number::Int(2)));
    }

    #[test]
    fn multiplicities_on_constant_matrices() {
        let f = fuzzy_factory();
        let d = Dimensions::square(3, 1);

        let empty = NumericMatrix::empty(d.clone(), false);
        assert!(empty.some(&f).is_false());
        assert!(empty.none(&f).is_true());
        assert!(empty.lone(&f).is_true());
        assert!(empty.one(&f).is_false());

        let single = constant_matrix(&f, d.clone(), &[(1, 0.4)]);
        assert!(single.some(&f).is_true());
        assert!(single.none(&f).is_false());
        assert!(single.one(&f).is_true());
        assert!(single.lone(&f).is_true());

        let double = constant_matrix(&f, d, &[(0, 0.4), (1, 0.6)]);
        assert!(double.one(&f).is_false());
        assert!(double.lone(&f).is_false());
    }

    #[test]
    fn subset_on_constants() {
        let f = fuzzy_factory();
        let d = Dimensions::square(2, 1);
        let small = constant_matrix(&f, d.clone(), &[(0, 0.3)]);
        let large = constant_matrix(&f, d.clone(), &[(0, 0.5), (1, 0.2)]);

        assert!(small.subset(&large, &f).is_true());
        assert!(large.subset(&small, &f).is_false());
    }

    #[test]
    fn matrix_comparisons() {
        let f = fuzzy_factory();
        let d = Dimensions::square(2, 1);
        let a = constant_matrix(&f, d.clone(), &[(0, 0.3), (1, 0.5)]);
        let b = constant_matrix(&f, d.clone(), &[(0, 0.3), (1, 0.5)]);
        let c = constant_matrix(&f, d, &[(0, 0.4), (1, 0.5)]);

        assert!(a.eq(&b, &f).is_true());
        assert!(a.eq(&c, &f).is_false());
        assert!(a.lte(&c, &f).is_true());
        assert!(a.lt(&c, &f).is_true()); // one strict cell suffices
        assert!(a.lt(&b, &f).is_false()); // no strict cell
        assert!(c.gt(&a, &f).is_true());
    }

    #[test]
    fn override_keeps_rows_the_other_leaves_zero() {
        let f = integer_factory();
        let d = Dimensions::square(2, 2);
        let mut a = NumericMatrix::empty(d.clone(), false);
        a.set(0, f.int_constant(1)); // row 0
        a.set(3, f.int_constant(2)); // row 1
        let mut b = NumericMatrix::empty(d, false);
        b.set(2, f.int_constant(9)); // row 1 only

        let o = a.override_with(&b, &f);
        assert_eq!(o.get(0).as_number(), Some(Number::Int(1))); // row 0 kept
        assert_eq!(o.get(2).as_number(), Some(Number::Int(9))); // row 1 replaced
        assert!(o.get(3).is_zero());
    }

    #[test]
    fn alpha_cut_selects_cells_reaching_the_level() {
        let f = fuzzy_factory();
        let a = constant_matrix(&f, Dimensions::square(3, 1), &[(0, 0.2), (1, 0.5), (2, 0.9)]);
        let cut = a.alpha_cut(&f.constant(Number::Real(0.5)), &f);
        assert!(cut.is_boolean());
        assert!(cut.get(0).is_zero());
        assert!(cut.get(1).is_one());
        assert!(cut.get(2).is_one());
    }

    #[test]
    fn choice_on_constant_conditions() {
        let f = fuzzy_factory();
        let d = Dimensions::square(2, 1);
        let a = constant_matrix(&f, d.clone(), &[(0, 0.3)]);
        let b = constant_matrix(&f, d, &[(1, 0.7)]);

        let picked = a.choice(&BoolValue::TRUE, &b, &f);
        assert_eq!(weight(&picked, 0), 0.3);
        assert!(picked.get(1).is_zero());

        let rejected = a.choice(&BoolValue::FALSE, &b, &f);
        assert!(rejected.get(0).is_zero());
        assert_eq!(weight(&rejected, 1), 0.7);
    }

    #[test]
    fn cross_takes_the_tnorm_in_fuzzy() {
        let f = fuzzy_factory();
        let a = constant_matrix(&f, Dimensions::square(2, 1), &[(0, 0.5)]);
        let b = constant_matrix(&f, Dimensions::square(2, 1), &[(1, 0.3)]);
        let c = a.cross(&b, &f).unwrap();
        assert_eq!(c.dimensions().num_dimensions(), 2);
        assert_eq!(weight(&c, 1), 0.3); // min(0.5, 0.3) at (0, 1)
    }

    #[test]
    fn division_by_zero_cell_is_a_fault() {
        let f = integer_factory();
        let d = Dimensions::square(2, 1);
        let mut a = NumericMatrix::empty(d.clone(), false);
        a.set(0, f.int_constant(4));
        let b = NumericMatrix::empty(d, false);

        assert!(a.divide(&b, &f).is_err());
        assert!(a.modulo(&b, &f).is_err());
    }

    #[test]
    fn empty_against_empty() {
        let f = fuzzy_factory();
        let d = Dimensions::square(2, 1);
        let a = NumericMatrix::empty(d.clone(), false);
        let b = NumericMatrix::empty(d, false);

        assert_eq!(a.union(&b, &f).unwrap().density(), 0);
        assert_eq!(a.intersection(&b, &f).unwrap().density(), 0);
        assert!(a.eq(&b, &f).is_true());
        assert!(a.lt(&b, &f).is_false());
    }

    #[test]
    fn multi_dot_sums_products() {
        let f = integer_factory();
        let mut a = NumericMatrix::empty(Dimensions::square(2, 2), false);
        a.set(0, f.int_constant(2)); // (0,0)
        a.set(1, f.int_constant(3)); // (0,1)
        let mut b = NumericMatrix::empty(Dimensions::square(2, 2), false);
        b.set(0, f.int_constant(5)); // (0,0)
        b.set(2, f.int_constant(7)); // (1,0)

        let m = a.multi_dot(&b, &f);
        // (0,0) = 2*5 + 3*7
        assert_eq!(m.get(0).as_number(), Some(Number::Int(31)));
    }
}
