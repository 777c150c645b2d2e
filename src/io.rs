
//! Specialized binary input and output.
//! Uses the error handling for this crate.

pub use ::std::io::{Read, Write};
use lebe::prelude::*;
use crate::error::{Error, Result, UnitResult, UNEXPECTED_END_OF_STREAM};


/// Generic trait that defines common binary operations such as reading and writing for this type.
/// All values are stored in little endian byte order, as riff requires.
pub trait Data: Sized + Default + Clone {
    const BYTE_SIZE: usize = ::std::mem::size_of::<Self>();

    /// Read a value of type `Self`.
    fn read(read: &mut impl Read) -> Result<Self>;

    /// Read as many values of type `Self` as fit into the specified slice.
    /// If the slice cannot be filled completely, returns `Error::Invalid`.
    fn read_slice(read: &mut impl Read, slice: &mut[Self]) -> UnitResult;

    /// Write this value to the writer.
    fn write(self, write: &mut impl Write) -> UnitResult;

    /// Write all values of that slice to the writer.
    fn write_slice(write: &mut impl Write, slice: &[Self]) -> UnitResult;
}


macro_rules! implement_data_for_primitive {
    ($kind: ident) => {
        impl Data for $kind {
            #[inline]
            fn read(read: &mut impl Read) -> Result<Self> {
                Ok(read.read_from_little_endian()?)
            }

            #[inline]
            fn write(self, write: &mut impl Write) -> Result<()> {
                write.write_as_little_endian(&self)?;
                Ok(())
            }

            #[inline]
            fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> Result<()> {
                read.read_from_little_endian_into(slice)?;
                Ok(())
            }

            #[inline]
            fn write_slice(write: &mut impl Write, slice: &[Self]) -> Result<()> {
                write.write_as_little_endian(slice)?;
                Ok(())
            }
        }
    };
}

implement_data_for_primitive!(u8);
implement_data_for_primitive!(u16);
implement_data_for_primitive!(u32);


/// Read the 24 bit little endian integers used by the extended header and animation frames.
#[inline]
pub fn read_u24(read: &mut impl Read) -> Result<u32> {
    let mut bytes = [0_u8; 3];
    u8::read_slice(read, &mut bytes)?;
    Ok(u32::from(bytes[0]) | u32::from(bytes[1]) << 8 | u32::from(bytes[2]) << 16)
}

/// Write the lower 24 bits of the value in little endian order.
#[inline]
pub fn write_u24(write: &mut impl Write, value: u32) -> UnitResult {
    debug_assert!(value < (1 << 24), "value does not fit into 24 bits");
    u8::write_slice(write, &value.to_le_bytes()[.. 3])
}

/// Take the first byte of the slice, advancing the slice.
#[inline]
pub fn take_1(slice: &mut &[u8]) -> Result<u8> {
    if !slice.is_empty() {
        let result = slice[0];
        *slice = &slice[1..];
        Ok(result)

    } else {
        Err(Error::invalid(UNEXPECTED_END_OF_STREAM))
    }
}

/// Take the first `n` bytes of the slice, advancing the slice.
#[inline]
pub fn take_n<'s>(slice: &mut &'s [u8], n: usize) -> Result<&'s [u8]> {
    if n <= slice.len() {
        let (front, back) = slice.split_at(n);
        *slice = back;
        Ok(front)

    } else {
        Err(Error::invalid(UNEXPECTED_END_OF_STREAM))
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn little_endian_fields(){
        let mut bytes: &[u8] = &[0x52, 0x49, 0x46, 0x46, 0x24, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03];
        assert_eq!(u32::read(&mut bytes).unwrap(), 0x4646_4952);
        assert_eq!(u32::read(&mut bytes).unwrap(), 0x24);
        assert_eq!(read_u24(&mut bytes).unwrap(), 0x03_02_01);
        assert!(u8::read(&mut bytes).is_err());
    }

    #[test]
    fn u24_roundtrip(){
        let mut bytes = Vec::new();
        write_u24(&mut bytes, 0xAB_CD_EF).unwrap();
        assert_eq!(bytes, vec![0xEF, 0xCD, 0xAB]);
        assert_eq!(read_u24(&mut bytes.as_slice()).unwrap(), 0xAB_CD_EF);
    }

    #[test]
    fn take_slices(){
        let data = [1_u8, 2, 3];
        let mut remaining = &data[..];

        assert_eq!(take_1(&mut remaining).unwrap(), 1);
        assert_eq!(take_n(&mut remaining, 2).unwrap(), &[2, 3]);
        assert!(take_1(&mut remaining).is_err());
        assert!(take_n(&mut remaining, 1).is_err());
    }
}
