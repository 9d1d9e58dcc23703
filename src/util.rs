use std::fmt::Write;

use crate::error::HexConvError;

/// Formats a sequence of bytes as a `String` containing a hexadecimal blob
///
/// # Examples
///
/// ```
/// # use piecework::util::hex_of_bytes;
/// assert_eq!(hex_of_bytes(vec![0xde,0xad,0xbe,0xef]), String::from("deadbeef"));
/// ```
#[must_use]
pub fn hex_of_bytes<T>(val: T) -> String
where
    T: AsRef<[u8]>,
{
    let bytes = val.as_ref();
    let mut hex: String = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        match write!(&mut hex, "{byte:02x}") {
            Ok(_) => (),
            Err(_) => unreachable!("write to String should never fail"),
        };
    }
    hex
}

/// Attempt to parse a string-like type as a hexadecimal blob, returning
/// the sequence of bytes encoded if it is a valid hex-string.
///
/// # Errors
///
/// Returns `Err(OddParity(s))` if the string has odd length, and
/// `Err(NonHex(s))` if it contains anything other than hex digits
/// (case-insensitive).
///
/// # Examples
///
/// ```
/// # use piecework::util::bytes_of_hex;
/// assert_eq!(Ok(vec![0xde,0xad,0xbe,0xef]), bytes_of_hex("deadbeef"));
/// ```
pub fn bytes_of_hex<T>(src: &T) -> Result<Vec<u8>, HexConvError>
where
    T: AsRef<str> + ?Sized,
{
    let src: &str = src.as_ref();
    let ascii_len = src.len();

    if ascii_len % 2 != 0 {
        return Err(HexConvError::OddParity(src.to_owned()));
    }

    let mut dst = Vec::with_capacity(ascii_len / 2);

    for ix in (0..ascii_len).step_by(2) {
        match src
            .get(ix..ix + 2)
            .and_then(|word| u8::from_str_radix(word, 16).ok())
        {
            Some(word) => dst.push(word),
            None => return Err(HexConvError::NonHex(src.to_owned())),
        }
    }
    Ok(dst)
}
