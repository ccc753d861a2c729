use std::io;

use tracing::{debug, info};
use windows::{
    core::{HSTRING, PCWSTR},
    Win32::{
        Foundation::{ERROR_FILE_NOT_FOUND, ERROR_SUCCESS, WIN32_ERROR},
        System::Registry::{
            RegCloseKey, RegCreateKeyExW, RegDeleteTreeW, RegGetValueW, RegSetValueExW, HKEY,
            HKEY_LOCAL_MACHINE, KEY_WRITE, REG_OPTION_NON_VOLATILE, REG_SZ, RRF_RT_REG_SZ,
        },
    },
};

use crate::error::BlockerError;

use super::{unique_patterns, Browser, PolicyStore};

/// Writes the blocklist into `HKLM\SOFTWARE\Policies\<vendor>\URLBlocklist` as numbered `REG_SZ`
/// values, the layout Chromium browsers expect for list policies.
pub struct RegistryPolicyStore {
    browsers: Vec<Browser>,
}

impl RegistryPolicyStore {
    pub fn new(browsers: Vec<Browser>) -> Self {
        Self { browsers }
    }
}

fn check(status: WIN32_ERROR, action: impl FnOnce() -> String) -> Result<(), BlockerError> {
    if status == ERROR_SUCCESS {
        Ok(())
    } else {
        Err(BlockerError::io(
            action(),
            io::Error::from_raw_os_error(status.0 as i32),
        ))
    }
}

fn wide_bytes(value: &str) -> Vec<u8> {
    value
        .encode_utf16()
        .chain(Some(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}

fn delete_key(key: &str) -> Result<(), BlockerError> {
    let status = unsafe { RegDeleteTreeW(HKEY_LOCAL_MACHINE, &HSTRING::from(key)) };
    if status == ERROR_FILE_NOT_FOUND {
        return Ok(());
    }
    check(status, || format!("deleting registry key {key}"))
}

fn write_key(key: &str, patterns: &[&str]) -> Result<(), BlockerError> {
    let mut handle = HKEY::default();
    let status = unsafe {
        RegCreateKeyExW(
            HKEY_LOCAL_MACHINE,
            &HSTRING::from(key),
            0,
            PCWSTR::null(),
            REG_OPTION_NON_VOLATILE,
            KEY_WRITE,
            None,
            &mut handle,
            None,
        )
    };
    check(status, || format!("creating registry key {key}"))?;

    let result = patterns
        .iter()
        .enumerate()
        .try_for_each(|(index, pattern)| {
            let name = (index + 1).to_string();
            let status = unsafe {
                RegSetValueExW(
                    handle,
                    &HSTRING::from(name.as_str()),
                    0,
                    REG_SZ,
                    Some(&wide_bytes(pattern)),
                )
            };
            check(status, || format!("writing registry value {key}\\{name}"))
        });

    let _ = unsafe { RegCloseKey(handle) };
    result
}

fn read_key(key: &str) -> Result<Vec<String>, BlockerError> {
    let key_name = HSTRING::from(key);
    let mut patterns = vec![];
    let mut buffer = [0u16; 2048];
    for index in 1.. {
        let name = HSTRING::from(index.to_string().as_str());
        let mut size = (buffer.len() * size_of::<u16>()) as u32;
        let status = unsafe {
            RegGetValueW(
                HKEY_LOCAL_MACHINE,
                &key_name,
                &name,
                RRF_RT_REG_SZ,
                None,
                Some(buffer.as_mut_ptr().cast()),
                Some(&mut size),
            )
        };
        if status == ERROR_FILE_NOT_FOUND {
            break;
        }
        check(status, || format!("reading registry value {key}\\{index}"))?;
        let length = size as usize / size_of::<u16>();
        let value = String::from_utf16_lossy(&buffer[..length]);
        patterns.push(value.trim_end_matches('\0').to_owned());
    }
    Ok(patterns)
}

impl PolicyStore for RegistryPolicyStore {
    fn apply(&mut self, patterns: &[String]) -> Result<(), BlockerError> {
        let patterns = unique_patterns(patterns);
        for browser in &self.browsers {
            let key = browser.registry_key();
            if read_key(key)? == patterns {
                debug!("Policy {key} already up to date");
                continue;
            }
            delete_key(key)?;
            if !patterns.is_empty() {
                write_key(key, &patterns)?;
            }
            info!("Wrote {} url patterns into {key}", patterns.len());
        }
        Ok(())
    }

    fn remove_all(&mut self) -> Result<(), BlockerError> {
        for browser in &self.browsers {
            delete_key(browser.registry_key())?;
        }
        Ok(())
    }

    fn current(&self) -> Result<Vec<String>, BlockerError> {
        match self.browsers.first() {
            Some(browser) => read_key(browser.registry_key()),
            None => Ok(vec![]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::wide_bytes;

    #[test]
    fn values_are_nul_terminated_utf16() {
        assert_eq!(wide_bytes("ab"), vec![b'a', 0, b'b', 0, 0, 0]);
    }
}
