/// The numeric tower (C1): Fixnum/Bignum/Flonum/Complex with closed,
/// promoting arithmetic.
///
/// Double dispatch is a two-level match: the outer match peels off
/// `Complex` contagion (first on the left operand, then the right), the
/// inner match (`promote`) resolves the Fixnum/Bignum/Flonum pair to a
/// common representation. This is the direct encoding of the
/// `__extend__`-per-class dispatch in the system this tower was ported
/// from, collapsed from one method per (type, type) pair into one table
/// (Design Notes §9).

use crate::errors::NumericError;
use crate::value::Value;
use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed, ToPrimitive, Zero};
use std::cmp::Ordering;

fn domain_error(found: &Value) -> NumericError {
    NumericError::DomainError { message: format!("expected a number, found a {}", found.type_name()) }
}

/// Any `Bignum` producible by an operation here that fits a machine int is
/// returned as `Fixnum` instead — canonicalisation (§4.1).
fn canon_bigint(b: BigInt) -> Value {
    match b.to_i64() {
        Some(n) => Value::Fixnum(n),
        None => Value::Bignum(b),
    }
}

enum Real {
    Fix(i64),
    Big(BigInt),
    Flo(f64),
}

fn classify(v: &Value) -> Result<Real, NumericError> {
    match v {
        Value::Fixnum(n) => Ok(Real::Fix(*n)),
        Value::Bignum(b) => Ok(Real::Big(b.clone())),
        Value::Flonum(f) => Ok(Real::Flo(*f)),
        other => Err(domain_error(other)),
    }
}

enum Promoted {
    Fix(i64, i64),
    Big(BigInt, BigInt),
    Flo(f64, f64),
}

fn real_to_f64(r: &Real) -> f64 {
    match r {
        Real::Fix(n) => *n as f64,
        Real::Big(b) => b.to_f64().unwrap_or(f64::NAN),
        Real::Flo(f) => *f,
    }
}

fn promote(a: Real, b: Real) -> Promoted {
    match (a, b) {
        (Real::Flo(x), y) => Promoted::Flo(x, real_to_f64(&y)),
        (x, Real::Flo(y)) => Promoted::Flo(real_to_f64(&x), y),
        (Real::Big(x), Real::Big(y)) => Promoted::Big(x, y),
        (Real::Big(x), Real::Fix(y)) => Promoted::Big(x, BigInt::from(y)),
        (Real::Fix(x), Real::Big(y)) => Promoted::Big(BigInt::from(x), y),
        (Real::Fix(x), Real::Fix(y)) => Promoted::Fix(x, y),
    }
}

fn to_f64_value(v: &Value) -> Result<f64, NumericError> {
    Ok(real_to_f64(&classify(v)?))
}

fn exact_from_f64(f: f64) -> Value {
    if f.is_finite() && f.abs() < 9.2e18 {
        Value::Fixnum(f as i64)
    } else {
        BigInt::from_f64(f).map(canon_bigint).unwrap_or(Value::Fixnum(0))
    }
}

// ---------------------------------------------------------------------------
// Binary arithmetic
// ---------------------------------------------------------------------------

pub fn add(a: &Value, b: &Value) -> Result<Value, NumericError> {
    match (a, b) {
        (Value::Complex(a_re, a_im), Value::Complex(b_re, b_im)) => {
            Ok(Value::Complex(Box::new(add(a_re, b_re)?), Box::new(add(a_im, b_im)?)))
        }
        (Value::Complex(a_re, a_im), other) => {
            Ok(Value::Complex(Box::new(add(a_re, other)?), a_im.clone()))
        }
        (other, Value::Complex(b_re, b_im)) => {
            Ok(Value::Complex(Box::new(add(other, b_re)?), b_im.clone()))
        }
        _ => real_add(a, b),
    }
}

fn real_add(a: &Value, b: &Value) -> Result<Value, NumericError> {
    match promote(classify(a)?, classify(b)?) {
        Promoted::Fix(x, y) => match x.checked_add(y) {
            Some(s) => Ok(Value::Fixnum(s)),
            None => Ok(canon_bigint(BigInt::from(x) + BigInt::from(y))),
        },
        Promoted::Big(x, y) => Ok(canon_bigint(x + y)),
        Promoted::Flo(x, y) => Ok(Value::Flonum(x + y)),
    }
}

pub fn neg(a: &Value) -> Result<Value, NumericError> {
    match a {
        Value::Fixnum(n) => match n.checked_neg() {
            Some(v) => Ok(Value::Fixnum(v)),
            None => Ok(canon_bigint(-BigInt::from(*n))),
        },
        Value::Bignum(b) => Ok(canon_bigint(-b.clone())),
        Value::Flonum(f) => Ok(Value::Flonum(-f)),
        Value::Complex(re, im) => Ok(Value::Complex(Box::new(neg(re)?), Box::new(neg(im)?))),
        other => Err(domain_error(other)),
    }
}

pub fn sub(a: &Value, b: &Value) -> Result<Value, NumericError> {
    add(a, &neg(b)?)
}

pub fn mul(a: &Value, b: &Value) -> Result<Value, NumericError> {
    match (a, b) {
        (Value::Complex(a_re, a_im), Value::Complex(b_re, b_im)) => {
            // (ac - bd) + (ad + bc)i
            let ac = mul(a_re, b_re)?;
            let bd = mul(a_im, b_im)?;
            let ad = mul(a_re, b_im)?;
            let bc = mul(a_im, b_re)?;
            Ok(Value::Complex(Box::new(sub(&ac, &bd)?), Box::new(add(&ad, &bc)?)))
        }
        (Value::Complex(a_re, a_im), other) => {
            Ok(Value::Complex(Box::new(mul(a_re, other)?), Box::new(mul(a_im, other)?)))
        }
        (other, Value::Complex(b_re, b_im)) => {
            Ok(Value::Complex(Box::new(mul(other, b_re)?), Box::new(mul(other, b_im)?)))
        }
        _ => real_mul(a, b),
    }
}

fn real_mul(a: &Value, b: &Value) -> Result<Value, NumericError> {
    match promote(classify(a)?, classify(b)?) {
        Promoted::Fix(x, y) => match x.checked_mul(y) {
            Some(p) => Ok(Value::Fixnum(p)),
            None => Ok(canon_bigint(BigInt::from(x) * BigInt::from(y))),
        },
        Promoted::Big(x, y) => Ok(canon_bigint(x * y)),
        Promoted::Flo(x, y) => Ok(Value::Flonum(x * y)),
    }
}

fn is_exact_zero(v: &Value) -> bool {
    matches!(v, Value::Fixnum(0)) || matches!(v, Value::Bignum(b) if b.is_zero())
}

/// `1/(a+bi) = (a-bi)/(a^2+b^2)` (§4.1).
fn complex_reciprocal(re: &Value, im: &Value) -> Result<(Value, Value), NumericError> {
    let denom = add(&mul(re, re)?, &mul(im, im)?)?;
    if is_exact_zero(&denom) || matches!(&denom, Value::Flonum(f) if *f == 0.0) {
        return Err(NumericError::ZeroDivisor);
    }
    let new_re = div(re, &denom)?;
    let new_im = div(&neg(im)?, &denom)?;
    Ok((new_re, new_im))
}

pub fn div(a: &Value, b: &Value) -> Result<Value, NumericError> {
    match (a, b) {
        (Value::Complex(_, _), Value::Complex(b_re, b_im)) => {
            let (rre, rim) = complex_reciprocal(b_re, b_im)?;
            mul(a, &Value::Complex(Box::new(rre), Box::new(rim)))
        }
        (Value::Complex(a_re, a_im), other) => {
            Ok(Value::Complex(Box::new(div(a_re, other)?), Box::new(div(a_im, other)?)))
        }
        (other, Value::Complex(b_re, b_im)) => {
            let (rre, rim) = complex_reciprocal(b_re, b_im)?;
            mul(other, &Value::Complex(Box::new(rre), Box::new(rim)))
        }
        _ => real_div(a, b),
    }
}

fn real_div(a: &Value, b: &Value) -> Result<Value, NumericError> {
    match promote(classify(a)?, classify(b)?) {
        Promoted::Fix(x, y) => {
            if y == 0 {
                return Err(NumericError::ZeroDivisor);
            }
            if x % y == 0 {
                Ok(Value::Fixnum(x / y))
            } else {
                Err(NumericError::UnsupportedExactRational)
            }
        }
        Promoted::Big(x, y) => {
            if y.is_zero() {
                return Err(NumericError::ZeroDivisor);
            }
            let r = &x % &y;
            if r.is_zero() {
                Ok(canon_bigint(x / y))
            } else {
                Err(NumericError::UnsupportedExactRational)
            }
        }
        Promoted::Flo(x, y) => {
            if y == 0.0 {
                return Err(NumericError::ZeroDivisor);
            }
            Ok(Value::Flonum(x / y))
        }
    }
}

pub fn quotient(a: &Value, b: &Value) -> Result<Value, NumericError> {
    match promote(classify(a)?, classify(b)?) {
        Promoted::Fix(x, y) => {
            if y == 0 {
                return Err(NumericError::ZeroDivisor);
            }
            if x == i64::MIN && y == -1 {
                Ok(canon_bigint(-BigInt::from(x)))
            } else {
                Ok(Value::Fixnum(x.wrapping_div(y)))
            }
        }
        Promoted::Big(x, y) => {
            if y.is_zero() {
                return Err(NumericError::ZeroDivisor);
            }
            Ok(canon_bigint(x / y))
        }
        Promoted::Flo(x, y) => {
            if y == 0.0 {
                return Err(NumericError::ZeroDivisor);
            }
            Ok(Value::Flonum((x / y).trunc()))
        }
    }
}

pub fn modulo(a: &Value, b: &Value) -> Result<Value, NumericError> {
    match promote(classify(a)?, classify(b)?) {
        Promoted::Fix(x, y) => {
            if y == 0 {
                return Err(NumericError::ZeroDivisor);
            }
            let r = x % y;
            Ok(Value::Fixnum(if r != 0 && (r < 0) != (y < 0) { r + y } else { r }))
        }
        Promoted::Big(x, y) => {
            if y.is_zero() {
                return Err(NumericError::ZeroDivisor);
            }
            let r = &x % &y;
            let r = if !r.is_zero() && r.is_negative() != y.is_negative() { r + y.clone() } else { r };
            Ok(canon_bigint(r))
        }
        Promoted::Flo(x, y) => {
            if y == 0.0 {
                return Err(NumericError::ZeroDivisor);
            }
            let r = x % y;
            Ok(Value::Flonum(if r != 0.0 && (r < 0.0) != (y < 0.0) { r + y } else { r }))
        }
    }
}

pub fn pow(a: &Value, b: &Value) -> Result<Value, NumericError> {
    match b {
        Value::Fixnum(e) if *e >= 0 => pow_nonneg_int(a, *e as u64),
        Value::Bignum(e) if !e.is_negative() => {
            let e_u = e
                .to_u64()
                .ok_or_else(|| NumericError::DomainError { message: "exponent too large".to_string() })?;
            pow_nonneg_int(a, e_u)
        }
        Value::Flonum(e) => Ok(Value::Flonum(to_f64_value(a)?.powf(*e))),
        // A negative exact exponent of an exact base would be a rational
        // unless the base is a unit; the core signals rather than guess.
        _ => Err(NumericError::UnsupportedExactRational),
    }
}

fn pow_nonneg_int(a: &Value, mut e: u64) -> Result<Value, NumericError> {
    let mut result = Value::Fixnum(1);
    let mut base = a.clone();
    while e > 0 {
        if e & 1 == 1 {
            result = mul(&result, &base)?;
        }
        e >>= 1;
        if e > 0 {
            base = mul(&base, &base)?;
        }
    }
    Ok(result)
}

// ---------------------------------------------------------------------------
// Shifts (§4.1: "Right/left shift by a bignum amount that does not fit a
// machine int fails with ShiftAmountTooLarge")
// ---------------------------------------------------------------------------

fn shift_amount(v: &Value) -> Result<(i64, bool), NumericError> {
    match v {
        Value::Fixnum(n) => Ok((*n, false)),
        Value::Bignum(b) => match b.to_i64() {
            Some(n) => Ok((n, true)),
            None => Err(NumericError::ShiftAmountTooLarge),
        },
        other => Err(domain_error(other)),
    }
}

pub fn shl(a: &Value, amount: &Value) -> Result<Value, NumericError> {
    let (amt, amt_is_big) = shift_amount(amount)?;
    if amt < 0 {
        return Err(NumericError::DomainError { message: "shift amount must be nonnegative".to_string() });
    }
    match a {
        // Fixnum shifted by a fixnum amount masks to machine-int width.
        Value::Fixnum(n) if !amt_is_big => {
            if amt >= 64 {
                Ok(Value::Fixnum(0))
            } else {
                Ok(Value::Fixnum(n.wrapping_shl(amt as u32)))
            }
        }
        // Either operand being bignum means an exact-width result.
        Value::Fixnum(n) => Ok(canon_bigint(BigInt::from(*n) << amt as usize)),
        Value::Bignum(b) => Ok(canon_bigint(b.clone() << amt as usize)),
        other => Err(domain_error(other)),
    }
}

pub fn shr(a: &Value, amount: &Value) -> Result<Value, NumericError> {
    let (amt, _) = shift_amount(amount)?;
    if amt < 0 {
        return Err(NumericError::DomainError { message: "shift amount must be nonnegative".to_string() });
    }
    match a {
        Value::Fixnum(n) => {
            if amt >= 64 {
                Ok(Value::Fixnum(if *n < 0 { -1 } else { 0 }))
            } else {
                Ok(Value::Fixnum(n >> amt))
            }
        }
        Value::Bignum(b) => Ok(canon_bigint(b.clone() >> amt as usize)),
        other => Err(domain_error(other)),
    }
}

/// `arithmetic-shift`: positive amount shifts left, negative shifts right.
pub fn arithmetic_shift(a: &Value, amount: &Value) -> Result<Value, NumericError> {
    let (amt, _) = shift_amount(amount)?;
    if amt >= 0 {
        shl(a, amount)
    } else {
        shr(a, &neg(amount)?)
    }
}

// ---------------------------------------------------------------------------
// Bitwise ops (exact integers only)
// ---------------------------------------------------------------------------

fn as_bigint(v: &Value) -> Result<BigInt, NumericError> {
    match v {
        Value::Fixnum(n) => Ok(BigInt::from(*n)),
        Value::Bignum(b) => Ok(b.clone()),
        other => Err(NumericError::DomainError {
            message: format!("expected an exact integer, found a {}", other.type_name()),
        }),
    }
}

pub fn bitand(a: &Value, b: &Value) -> Result<Value, NumericError> {
    match (a, b) {
        (Value::Fixnum(x), Value::Fixnum(y)) => Ok(Value::Fixnum(x & y)),
        _ => Ok(canon_bigint(as_bigint(a)? & as_bigint(b)?)),
    }
}

pub fn bitor(a: &Value, b: &Value) -> Result<Value, NumericError> {
    match (a, b) {
        (Value::Fixnum(x), Value::Fixnum(y)) => Ok(Value::Fixnum(x | y)),
        _ => Ok(canon_bigint(as_bigint(a)? | as_bigint(b)?)),
    }
}

pub fn bitxor(a: &Value, b: &Value) -> Result<Value, NumericError> {
    match (a, b) {
        (Value::Fixnum(x), Value::Fixnum(y)) => Ok(Value::Fixnum(x ^ y)),
        _ => Ok(canon_bigint(as_bigint(a)? ^ as_bigint(b)?)),
    }
}

pub fn bitnot(a: &Value) -> Result<Value, NumericError> {
    match a {
        Value::Fixnum(n) => Ok(Value::Fixnum(!n)),
        Value::Bignum(b) => Ok(canon_bigint(-(b.clone() + BigInt::from(1)))),
        other => Err(domain_error(other)),
    }
}

// ---------------------------------------------------------------------------
// max/min
// ---------------------------------------------------------------------------

fn compare_reals(a: &Real, b: &Real) -> Ordering {
    match promote(
        match a {
            Real::Fix(n) => Real::Fix(*n),
            Real::Big(n) => Real::Big(n.clone()),
            Real::Flo(n) => Real::Flo(*n),
        },
        match b {
            Real::Fix(n) => Real::Fix(*n),
            Real::Big(n) => Real::Big(n.clone()),
            Real::Flo(n) => Real::Flo(*n),
        },
    ) {
        Promoted::Fix(x, y) => x.cmp(&y),
        Promoted::Big(x, y) => x.cmp(&y),
        Promoted::Flo(x, y) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

fn extremum(a: &Value, b: &Value, want_max: bool) -> Result<Value, NumericError> {
    if matches!(a, Value::Complex(..)) || matches!(b, Value::Complex(..)) {
        return Err(NumericError::DomainError { message: "max/min is not defined on complex numbers".to_string() });
    }
    let ra = classify(a)?;
    let rb = classify(b)?;
    let inexact = matches!(ra, Real::Flo(_)) || matches!(rb, Real::Flo(_));
    let cmp = compare_reals(&ra, &rb);
    let winner = if (want_max && cmp != Ordering::Less) || (!want_max && cmp != Ordering::Greater) {
        a.clone()
    } else {
        b.clone()
    };
    if inexact {
        exact_to_inexact(&winner)
    } else {
        Ok(winner)
    }
}

pub fn max(a: &Value, b: &Value) -> Result<Value, NumericError> {
    extremum(a, b, true)
}

pub fn min(a: &Value, b: &Value) -> Result<Value, NumericError> {
    extremum(a, b, false)
}

// ---------------------------------------------------------------------------
// Other unary ops
// ---------------------------------------------------------------------------

pub fn abs(a: &Value) -> Result<Value, NumericError> {
    match a {
        Value::Fixnum(n) if *n == i64::MIN => Ok(canon_bigint(BigInt::from(*n).abs())),
        Value::Fixnum(n) => Ok(Value::Fixnum(n.abs())),
        Value::Bignum(b) => Ok(canon_bigint(b.abs())),
        Value::Flonum(f) => Ok(Value::Flonum(f.abs())),
        Value::Complex(..) => Err(NumericError::DomainError { message: "abs is not defined on complex numbers".to_string() }),
        other => Err(domain_error(other)),
    }
}

pub fn sub1(a: &Value) -> Result<Value, NumericError> {
    sub(a, &Value::Fixnum(1))
}

pub fn round(a: &Value) -> Result<Value, NumericError> {
    match a {
        Value::Fixnum(_) | Value::Bignum(_) => Ok(a.clone()),
        Value::Flonum(f) => Ok(round_half_away_from_zero(*f)),
        other => Err(domain_error(other)),
    }
}

/// `floor(fval*factor + 0.5) * factor` — ported 1:1 from the original's
/// `W_Flonum.arith_round`.
fn round_half_away_from_zero(f: f64) -> Value {
    let factor = if f >= 0.0 { 1.0 } else { -1.0 };
    let v = f * factor;
    exact_from_f64((v + 0.5).floor() * factor)
}

pub fn floor(a: &Value) -> Result<Value, NumericError> {
    match a {
        Value::Fixnum(_) | Value::Bignum(_) => Ok(a.clone()),
        Value::Flonum(f) => Ok(exact_from_f64(f.floor())),
        other => Err(domain_error(other)),
    }
}

pub fn ceiling(a: &Value) -> Result<Value, NumericError> {
    match a {
        Value::Fixnum(_) | Value::Bignum(_) => Ok(a.clone()),
        Value::Flonum(f) => Ok(exact_from_f64(f.ceil())),
        other => Err(domain_error(other)),
    }
}

pub fn float_integer_part(a: &Value) -> Result<Value, NumericError> {
    match a {
        Value::Flonum(f) => Ok(Value::Flonum(f.trunc())),
        Value::Fixnum(_) | Value::Bignum(_) => Ok(a.clone()),
        other => Err(domain_error(other)),
    }
}

pub fn float_fractional_part(a: &Value) -> Result<Value, NumericError> {
    match a {
        Value::Flonum(f) => Ok(Value::Flonum(f - f.trunc())),
        Value::Fixnum(_) | Value::Bignum(_) => Ok(Value::Fixnum(0)),
        other => Err(domain_error(other)),
    }
}

pub fn sin(a: &Value) -> Result<Value, NumericError> {
    Ok(Value::Flonum(to_f64_value(a)?.sin()))
}

pub fn cos(a: &Value) -> Result<Value, NumericError> {
    Ok(Value::Flonum(to_f64_value(a)?.cos()))
}

pub fn atan(a: &Value) -> Result<Value, NumericError> {
    Ok(Value::Flonum(to_f64_value(a)?.atan()))
}

pub fn log(a: &Value) -> Result<Value, NumericError> {
    Ok(Value::Flonum(to_f64_value(a)?.ln()))
}

pub fn sqrt(a: &Value) -> Result<Value, NumericError> {
    Ok(Value::Flonum(to_f64_value(a)?.sqrt()))
}

pub fn inexact_to_exact(a: &Value) -> Result<Value, NumericError> {
    match a {
        Value::Fixnum(_) | Value::Bignum(_) => Ok(a.clone()),
        Value::Flonum(f) => {
            if f.is_finite() && f.fract() == 0.0 {
                Ok(exact_from_f64(*f))
            } else {
                Err(NumericError::UnsupportedExactRational)
            }
        }
        Value::Complex(re, im) => {
            Ok(Value::Complex(Box::new(inexact_to_exact(re)?), Box::new(inexact_to_exact(im)?)))
        }
        other => Err(domain_error(other)),
    }
}

pub fn exact_to_inexact(a: &Value) -> Result<Value, NumericError> {
    match a {
        Value::Flonum(_) => Ok(a.clone()),
        Value::Fixnum(_) | Value::Bignum(_) => Ok(Value::Flonum(to_f64_value(a)?)),
        Value::Complex(re, im) => {
            Ok(Value::Complex(Box::new(exact_to_inexact(re)?), Box::new(exact_to_inexact(im)?)))
        }
        other => Err(domain_error(other)),
    }
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

pub fn is_zero(a: &Value) -> Result<bool, NumericError> {
    match a {
        Value::Fixnum(n) => Ok(*n == 0),
        // Open Question resolution (SPEC_FULL §8): this is `is_zero`, not
        // its negation.
        Value::Bignum(b) => Ok(b.is_zero()),
        Value::Flonum(f) => Ok(*f == 0.0),
        Value::Complex(re, im) => Ok(is_zero(re)? && is_zero(im)?),
        other => Err(domain_error(other)),
    }
}

pub fn is_positive(a: &Value) -> Result<bool, NumericError> {
    match a {
        Value::Fixnum(n) => Ok(*n > 0),
        Value::Bignum(b) => Ok(b.is_positive()),
        Value::Flonum(f) => Ok(*f > 0.0),
        Value::Complex(..) => Err(NumericError::DomainError { message: "positive? is not defined on complex numbers".to_string() }),
        other => Err(domain_error(other)),
    }
}

pub fn is_negative(a: &Value) -> Result<bool, NumericError> {
    match a {
        Value::Fixnum(n) => Ok(*n < 0),
        Value::Bignum(b) => Ok(b.is_negative()),
        Value::Flonum(f) => Ok(*f < 0.0),
        Value::Complex(..) => Err(NumericError::DomainError { message: "negative? is not defined on complex numbers".to_string() }),
        other => Err(domain_error(other)),
    }
}

pub fn is_even(a: &Value) -> Result<bool, NumericError> {
    match a {
        Value::Fixnum(n) => Ok(n % 2 == 0),
        Value::Bignum(b) => Ok((b % BigInt::from(2)).is_zero()),
        other => Err(NumericError::DomainError { message: format!("even? requires an exact integer, found a {}", other.type_name()) }),
    }
}

pub fn is_odd(a: &Value) -> Result<bool, NumericError> {
    is_even(a).map(|e| !e)
}

/// Structural numeric equality used by `Value::equal` — cross-exactness
/// comparisons are false (equal? on numbers matches eqv?, not `=`).
pub fn numeric_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Complex(a_re, a_im), Value::Complex(b_re, b_im)) => {
            numeric_equal(a_re, b_re) && numeric_equal(a_im, b_im)
        }
        (Value::Complex(..), _) | (_, Value::Complex(..)) => false,
        _ => match (classify(a), classify(b)) {
            (Ok(ra), Ok(rb)) => match promote(ra, rb) {
                Promoted::Fix(x, y) => x == y,
                Promoted::Big(x, y) => x == y,
                Promoted::Flo(x, y) => x == y,
            },
            _ => false,
        },
    }
}
