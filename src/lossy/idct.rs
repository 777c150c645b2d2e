
//! The 4x4 integer transforms: the DCT of each block
//! and the Walsh-Hadamard transform of the luma DC terms.
//! Coefficients are in raster order, rows of four.

/// Multiply by `sqrt(2) * cos(pi / 8)` in 16 bit fixed point.
#[inline]
fn multiply_cos(value: i32) -> i32 {
    ((i64::from(value) * 20091) >> 16) as i32 + value
}

/// Multiply by `sqrt(2) * sin(pi / 8)` in 16 bit fixed point.
#[inline]
fn multiply_sin(value: i32) -> i32 {
    ((i64::from(value) * 35468) >> 16) as i32
}

/// The residual of a block, to be added to its prediction.
pub fn inverse_dct(coefficients: &[i16; 16]) -> [i32; 16] {
    let mut columns = [0_i32; 16];

    for x in 0 .. 4 {
        let coefficient = |y: usize| i32::from(coefficients[y * 4 + x]);

        let a = coefficient(0) + coefficient(2);
        let b = coefficient(0) - coefficient(2);
        let c = multiply_sin(coefficient(1)) - multiply_cos(coefficient(3));
        let d = multiply_cos(coefficient(1)) + multiply_sin(coefficient(3));

        columns[x * 4] = a + d;
        columns[x * 4 + 1] = b + c;
        columns[x * 4 + 2] = b - c;
        columns[x * 4 + 3] = a - d;
    }

    let mut residual = [0_i32; 16];

    for y in 0 .. 4 {
        let column = |x: usize| columns[x * 4 + y];

        let dc = column(0) + 4;
        let a = dc + column(2);
        let b = dc - column(2);
        let c = multiply_sin(column(1)) - multiply_cos(column(3));
        let d = multiply_cos(column(1)) + multiply_sin(column(3));

        residual[y * 4] = (a + d) >> 3;
        residual[y * 4 + 1] = (b + c) >> 3;
        residual[y * 4 + 2] = (b - c) >> 3;
        residual[y * 4 + 3] = (a - d) >> 3;
    }

    residual
}

/// The residual of a block whose only coefficient is the DC term, which is the same for every pixel.
#[inline]
pub fn inverse_dct_dc_only(dc: i16) -> i32 {
    (i32::from(dc) + 4) >> 3
}

/// Recover the DC coefficients of the 16 luma blocks from the second order block.
pub fn inverse_wht(coefficients: &[i16; 16]) -> [i16; 16] {
    let mut intermediate = [0_i32; 16];

    for x in 0 .. 4 {
        let coefficient = |y: usize| i32::from(coefficients[y * 4 + x]);

        let a0 = coefficient(0) + coefficient(3);
        let a1 = coefficient(1) + coefficient(2);
        let a2 = coefficient(1) - coefficient(2);
        let a3 = coefficient(0) - coefficient(3);

        intermediate[x] = a0 + a1;
        intermediate[8 + x] = a0 - a1;
        intermediate[4 + x] = a3 + a2;
        intermediate[12 + x] = a3 - a2;
    }

    let mut dcs = [0_i16; 16];

    for y in 0 .. 4 {
        let row = &intermediate[y * 4 .. y * 4 + 4];

        let dc = row[0] + 3;
        let a0 = dc + row[3];
        let a1 = row[1] + row[2];
        let a2 = row[1] - row[2];
        let a3 = dc - row[3];

        // the values are stored with the same truncation as dequantized coefficients
        dcs[y * 4] = ((a0 + a1) >> 3) as i16;
        dcs[y * 4 + 1] = ((a3 + a2) >> 3) as i16;
        dcs[y * 4 + 2] = ((a0 - a1) >> 3) as i16;
        dcs[y * 4 + 3] = ((a3 - a2) >> 3) as i16;
    }

    dcs
}


/// The coefficients of a block of residual values, scaled like those the decoder expects.
pub fn forward_dct(residual: &[i32; 16]) -> [i32; 16] {
    let mut rows = [0_i32; 16];

    for y in 0 .. 4 {
        let sample = |x: usize| residual[y * 4 + x];

        let a = (sample(0) + sample(3)) * 8;
        let b = (sample(1) + sample(2)) * 8;
        let c = (sample(1) - sample(2)) * 8;
        let d = (sample(0) - sample(3)) * 8;

        rows[y * 4] = a + b;
        rows[y * 4 + 2] = a - b;
        rows[y * 4 + 1] = (c * 2217 + d * 5352 + 14500) >> 12;
        rows[y * 4 + 3] = (d * 2217 - c * 5352 + 7500) >> 12;
    }

    let mut coefficients = [0_i32; 16];

    for x in 0 .. 4 {
        let row = |y: usize| rows[y * 4 + x];

        let a = row(0) + row(3);
        let b = row(1) + row(2);
        let c = row(1) - row(2);
        let d = row(0) - row(3);

        coefficients[x] = (a + b + 7) >> 4;
        coefficients[8 + x] = (a - b + 7) >> 4;
        coefficients[4 + x] = ((c * 2217 + d * 5352 + 12000) >> 16) + i32::from(d != 0);
        coefficients[12 + x] = (d * 2217 - c * 5352 + 51000) >> 16;
    }

    coefficients
}

/// The second order coefficients of the 16 luma DC terms, in raster order of their blocks.
pub fn forward_wht(dcs: &[i32; 16]) -> [i32; 16] {
    let mut rows = [0_i32; 16];

    for y in 0 .. 4 {
        let dc = |x: usize| dcs[y * 4 + x];

        let a = (dc(0) + dc(2)) * 4;
        let d = (dc(1) + dc(3)) * 4;
        let c = (dc(1) - dc(3)) * 4;
        let b = (dc(0) - dc(2)) * 4;

        rows[y * 4] = a + d + i32::from(a != 0);
        rows[y * 4 + 1] = b + c;
        rows[y * 4 + 2] = b - c;
        rows[y * 4 + 3] = a - d;
    }

    let mut coefficients = [0_i32; 16];

    for x in 0 .. 4 {
        let row = |y: usize| rows[y * 4 + x];

        let a = row(0) + row(2);
        let d = row(1) + row(3);
        let c = row(1) - row(3);
        let b = row(0) - row(2);

        let round = |value: i32| (value + i32::from(value < 0) + 3) >> 3;
        coefficients[x] = round(a + d);
        coefficients[4 + x] = round(b + c);
        coefficients[8 + x] = round(b - c);
        coefficients[12 + x] = round(a - d);
    }

    coefficients
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dc_only_matches_full_transform(){
        for &dc in &[-2048_i16, -100, -5, -4, 0, 3, 4, 12, 999] {
            let mut coefficients = [0; 16];
            coefficients[0] = dc;

            let residual = inverse_dct(&coefficients);
            assert!(residual.iter().all(|&value| value == inverse_dct_dc_only(dc)), "dc {}", dc);
        }
    }

    #[test]
    fn forward_then_inverse_dct(){
        let residual: [i32; 16] = [
            10, -20, 30, 5,
            0, 64, -64, 12,
            -128, 100, 7, 7,
            3, 2, 1, 0,
        ];

        let coefficients = forward_dct(&residual);
        let mut rounded = [0_i16; 16];
        for (target, &value) in rounded.iter_mut().zip(&coefficients) { *target = value as i16; }

        let reconstructed = inverse_dct(&rounded);
        for (&original, &result) in residual.iter().zip(&reconstructed) {
            assert!((original - result).abs() <= 2, "{} became {}", original, result);
        }
    }

    #[test]
    fn forward_then_inverse_wht(){
        let dcs: [i32; 16] = [
            800, -40, 0, 13,
            -1000, 250, 250, 250,
            16, 16, 16, 16,
            2040, -2040, 0, 1,
        ];

        let coefficients = forward_wht(&dcs);
        let mut rounded = [0_i16; 16];
        for (target, &value) in rounded.iter_mut().zip(&coefficients) { *target = value as i16; }

        let reconstructed = inverse_wht(&rounded);
        for (&original, &result) in dcs.iter().zip(&reconstructed) {
            assert!((original - i32::from(result)).abs() <= 2, "{} became {}", original, result);
        }
    }

    #[test]
    fn flat_block_is_almost_only_dc(){
        let coefficients = forward_dct(&[50; 16]);
        assert_eq!(coefficients[0], 400);
        assert!(coefficients[1 ..].iter().all(|&value| value.abs() <= 1));
        assert_eq!(inverse_dct_dc_only(coefficients[0] as i16), 50);
    }
}
