//-
// Copyright (c) 2020, 2022, 2023, Jason Lingle
//
// This file is part of Crymap.
//
// Crymap is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Crymap is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Crymap. If not, see <http://www.gnu.org/licenses/>.

use std::borrow::Cow;

/// Decodes quoted-printable encoding, as described by RFC 2045.
///
/// Encoded bytes and soft line endings are both handled, the latter by
/// discarding. UNIX line endings are handled as well as DOS line endings.
///
/// This never fails. Invalid or truncated escapes are passed through
/// untransformed, as are 8-bit characters.
pub fn qp_decode(s: &[u8]) -> Cow<[u8]> {
    if memchr::memchr(b'=', s).is_none() {
        return Cow::Borrowed(s);
    }

    let mut decoded = Vec::with_capacity(s.len());
    let mut rest = s;
    while let Some(eq) = memchr::memchr(b'=', rest) {
        decoded.extend_from_slice(&rest[..eq]);
        let escape = &rest[eq + 1..];

        if escape.starts_with(b"\r\n") {
            rest = &escape[2..];
        } else if escape.starts_with(b"\n") {
            rest = &escape[1..];
        } else if let Some(byte) = escape
            .get(..2)
            .and_then(|hex| std::str::from_utf8(hex).ok())
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        {
            decoded.push(byte);
            rest = &escape[2..];
        } else {
            decoded.push(b'=');
            rest = escape;
        }
    }
    decoded.extend_from_slice(rest);

    Cow::Owned(decoded)
}
