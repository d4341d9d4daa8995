//! The start-up argument block handed to the image.

use std::{
    ffi::{c_char, CString},
    ptr,
};

use crate::{cli::search::PATH_SEPARATOR, Error, Result};

/// Program arguments and search path in the layout the image's boot code expects.
///
/// Owns every byte the cells point to; keep it alive for as long as the image runs.
#[derive(Debug)]
pub struct Environment {
    _strings: Vec<CString>,
    argv: Vec<*const c_char>,
    search_path: Vec<u8>,
    search_path_len: usize,
}

impl Environment {
    /// Builds the block for `program` invoked with `arguments` and searching `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Error`] if an argument contains a NUL byte.
    pub fn new(program: &str, arguments: &[String], path: &str) -> Result<Self> {
        let strings = std::iter::once(program)
            .chain(arguments.iter().map(String::as_str))
            .map(|argument| {
                CString::new(argument)
                    .map_err(|_| Error::Error(format!("argument {argument:?} contains a NUL byte")))
            })
            .collect::<Result<Vec<_>>>()?;

        let argv = strings
            .iter()
            .map(|string| string.as_ptr())
            .chain(std::iter::once(ptr::null()))
            .collect();

        let mut search_path: Vec<u8> = path
            .bytes()
            .map(|byte| if byte == PATH_SEPARATOR as u8 { 0 } else { byte })
            .collect();
        search_path.push(0);

        Ok(Environment {
            _strings: strings,
            argv,
            search_path,
            search_path_len: path.len(),
        })
    }

    /// Number of arguments, program name included.
    #[must_use]
    pub fn argc(&self) -> usize {
        self.argv.len() - 1
    }

    /// The search path with every separator replaced by NUL, NUL-terminated.
    #[must_use]
    pub fn search_path(&self) -> &[u8] {
        &self.search_path
    }

    /// The four start-up cells, top of stack first: `argc`, the address of the NUL-terminated
    /// `argv` array, the search path length and the address of the split search path.
    #[must_use]
    pub fn cells(&self) -> [usize; 4] {
        [
            self.argc(),
            self.argv.as_ptr() as usize,
            self.search_path_len,
            self.search_path.as_ptr() as usize,
        ]
    }
}
