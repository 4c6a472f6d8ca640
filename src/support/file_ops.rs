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

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use super::error::Error;

/// Atomically write `data` to `path`.
///
/// The data is first written to a temporary file under `tmp`, which must be
/// on the same file system as `path`, then synced and renamed into place, so
/// that readers observe either the old content or the new content in full.
///
/// If `overwrite` is false and `path` already exists, fails with
/// `AlreadyExists`.
pub fn spit(
    tmp: impl AsRef<Path>,
    path: impl AsRef<Path>,
    overwrite: bool,
    data: &[u8],
) -> io::Result<()> {
    let mut tf = tempfile::NamedTempFile::new_in(tmp)?;
    tf.as_file_mut().write_all(data)?;
    tf.as_file_mut().sync_all()?;
    if overwrite {
        tf.persist(path)?;
    } else {
        tf.persist_noclobber(path)?;
    }
    Ok(())
}

/// Serialise `value` as CBOR and `spit` it to `path`.
pub fn spit_cbor<T: Serialize>(
    tmp: impl AsRef<Path>,
    path: impl AsRef<Path>,
    overwrite: bool,
    value: &T,
) -> Result<(), Error> {
    let data = serde_cbor::to_vec(value)?;
    spit(tmp, path, overwrite, &data)?;
    Ok(())
}

/// Read and deserialise the CBOR file at `path`.
pub fn slurp_cbor<T: DeserializeOwned>(
    path: impl AsRef<Path>,
) -> Result<T, Error> {
    let data = fs::read(path)?;
    Ok(serde_cbor::from_slice(&data)?)
}

pub trait IgnoreKinds {
    fn ignore_already_exists(self) -> Self;
    fn ignore_not_found(self) -> Self;
}

impl<R: Default> IgnoreKinds for Result<R, io::Error> {
    fn ignore_already_exists(self) -> Self {
        match self {
            Err(e) if io::ErrorKind::AlreadyExists == e.kind() => {
                Ok(R::default())
            }
            r => r,
        }
    }

    fn ignore_not_found(self) -> Self {
        match self {
            Err(e) if io::ErrorKind::NotFound == e.kind() => Ok(R::default()),
            r => r,
        }
    }
}

pub trait ErrorTransforms {
    type Coerced;
    fn on_exists(self, error: Error) -> Self::Coerced;
    fn on_not_found(self, error: Error) -> Self::Coerced;
}

impl<R, E: Into<Error>> ErrorTransforms for Result<R, E> {
    type Coerced = Result<R, Error>;

    fn on_exists(self, error: Error) -> Result<R, Error> {
        match self.map_err(|e| e.into()) {
            Err(Error::Io(e)) if io::ErrorKind::AlreadyExists == e.kind() => {
                Err(error)
            }
            s => s,
        }
    }

    fn on_not_found(self, error: Error) -> Result<R, Error> {
        match self.map_err(|e| e.into()) {
            Err(Error::Io(e)) if io::ErrorKind::NotFound == e.kind() => {
                Err(error)
            }
            s => s,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn spit_and_slurp() {
        let root = tempfile::TempDir::new().unwrap();
        let path = root.path().join("data");

        spit_cbor(root.path(), &path, false, &vec![1u32, 2, 3]).unwrap();
        assert_eq!(vec![1u32, 2, 3], slurp_cbor::<Vec<u32>>(&path).unwrap());

        assert_matches!(
            Err(Error::MailboxExists),
            spit(root.path(), &path, false, b"x")
                .on_exists(Error::MailboxExists)
        );

        spit(root.path(), &path, true, b"x").unwrap();
        assert_eq!(b"x", &fs::read(&path).unwrap()[..]);

        assert_matches!(
            Err(Error::NxMessage),
            fs::read(root.path().join("nx")).on_not_found(Error::NxMessage)
        );
        assert!(fs::remove_file(root.path().join("nx"))
            .ignore_not_found()
            .is_ok());
    }
}
