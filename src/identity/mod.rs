use crate::error::Result;

pub trait ServiceIdentity: Send + Sync {
    fn uid(&self) -> Result<u32>;
    fn gid(&self) -> Result<u32>;
}

impl<I: ServiceIdentity + ?Sized> ServiceIdentity for Box<I> {
    fn uid(&self) -> Result<u32> {
        (**self).uid()
    }

    fn gid(&self) -> Result<u32> {
        (**self).gid()
    }
}

impl<I: ServiceIdentity + ?Sized> ServiceIdentity for &I {
    fn uid(&self) -> Result<u32> {
        (**self).uid()
    }

    fn gid(&self) -> Result<u32> {
        (**self).gid()
    }
}

/// Fixed ids, e.g. from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticIdentity {
    uid: u32,
    gid: u32,
}

impl StaticIdentity {
    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }
}

impl ServiceIdentity for StaticIdentity {
    fn uid(&self) -> Result<u32> {
        Ok(self.uid)
    }

    fn gid(&self) -> Result<u32> {
        Ok(self.gid)
    }
}

/// Effective uid/gid of the running process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessIdentity;

impl ServiceIdentity for ProcessIdentity {
    #[cfg(unix)]
    fn uid(&self) -> Result<u32> {
        // SAFETY: geteuid has no preconditions and cannot fail
        Ok(unsafe { libc::geteuid() })
    }

    #[cfg(unix)]
    fn gid(&self) -> Result<u32> {
        // SAFETY: getegid has no preconditions and cannot fail
        Ok(unsafe { libc::getegid() })
    }

    #[cfg(not(unix))]
    fn uid(&self) -> Result<u32> {
        Err(crate::error::KeyError::Identity(
            "process identity is only available on unix".to_string(),
        ))
    }

    #[cfg(not(unix))]
    fn gid(&self) -> Result<u32> {
        Err(crate::error::KeyError::Identity(
            "process identity is only available on unix".to_string(),
        ))
    }
}

/// Named user and group resolved through the system account database (NSS)
#[derive(Debug, Clone)]
pub struct UserDbIdentity {
    user: String,
    group: String,
}

impl UserDbIdentity {
    pub fn new(user: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            group: group.into(),
        }
    }
}

impl ServiceIdentity for UserDbIdentity {
    fn uid(&self) -> Result<u32> {
        nss::user_id(&self.user)
    }

    fn gid(&self) -> Result<u32> {
        nss::group_id(&self.group)
    }
}

#[cfg(unix)]
mod nss {
    use std::ffi::CString;
    use std::io;
    use std::mem::MaybeUninit;
    use std::ptr;

    use crate::error::{KeyError, Result};

    const INITIAL_BUF: usize = 1024;
    const MAX_BUF: usize = 1 << 20;

    pub(super) fn user_id(name: &str) -> Result<u32> {
        let cname = c_name(name)?;
        let entry = with_buffer("user", name, |buf| {
            let mut pwd = MaybeUninit::<libc::passwd>::uninit();
            let mut result: *mut libc::passwd = ptr::null_mut();
            // SAFETY: every pointer is valid for the duration of the call and
            // buf.len() is the capacity of the scratch buffer
            let rc = unsafe {
                libc::getpwnam_r(
                    cname.as_ptr(),
                    pwd.as_mut_ptr(),
                    buf.as_mut_ptr(),
                    buf.len(),
                    &mut result,
                )
            };
            // SAFETY: a non-null result points at `pwd`, which the call filled in
            (rc, (!result.is_null()).then(|| unsafe { (*result).pw_uid }))
        })?;
        Ok(entry)
    }

    pub(super) fn group_id(name: &str) -> Result<u32> {
        let cname = c_name(name)?;
        let entry = with_buffer("group", name, |buf| {
            let mut grp = MaybeUninit::<libc::group>::uninit();
            let mut result: *mut libc::group = ptr::null_mut();
            // SAFETY: every pointer is valid for the duration of the call and
            // buf.len() is the capacity of the scratch buffer
            let rc = unsafe {
                libc::getgrnam_r(
                    cname.as_ptr(),
                    grp.as_mut_ptr(),
                    buf.as_mut_ptr(),
                    buf.len(),
                    &mut result,
                )
            };
            // SAFETY: a non-null result points at `grp`, which the call filled in
            (rc, (!result.is_null()).then(|| unsafe { (*result).gr_gid }))
        })?;
        Ok(entry)
    }

    fn c_name(name: &str) -> Result<CString> {
        CString::new(name)
            .map_err(|_| KeyError::Identity(format!("invalid account name \"{}\"", name)))
    }

    // Retry with a larger scratch buffer while the lookup reports ERANGE
    fn with_buffer<F>(kind: &str, name: &str, mut lookup: F) -> Result<u32>
    where
        F: FnMut(&mut [libc::c_char]) -> (libc::c_int, Option<u32>),
    {
        let mut buf = vec![0 as libc::c_char; INITIAL_BUF];
        loop {
            match lookup(&mut buf) {
                (0, Some(id)) => return Ok(id),
                (0, None) => {
                    return Err(KeyError::Identity(format!("{} \"{}\" not found", kind, name)))
                }
                (libc::ERANGE, _) if buf.len() < MAX_BUF => {
                    let len = buf.len() * 2;
                    buf.resize(len, 0);
                }
                (rc, _) => {
                    return Err(KeyError::Identity(format!(
                        "cannot look up {} \"{}\": {}",
                        kind,
                        name,
                        io::Error::from_raw_os_error(rc)
                    )))
                }
            }
        }
    }
}

#[cfg(not(unix))]
mod nss {
    use crate::error::{KeyError, Result};

    pub(super) fn user_id(name: &str) -> Result<u32> {
        Err(KeyError::Identity(format!(
            "cannot resolve user \"{}\" on this platform",
            name
        )))
    }

    pub(super) fn group_id(name: &str) -> Result<u32> {
        Err(KeyError::Identity(format!(
            "cannot resolve group \"{}\" on this platform",
            name
        )))
    }
}
