//! Host process detection.

use tracing::debug;

/// Answers "is the host application running right now?".
pub trait ProcessProbe {
    fn is_running(&self) -> bool;
}

/// Looks for processes whose executable name matches one of `names`
/// (case-insensitive, `.exe` suffix optional).
#[derive(Debug, Clone)]
pub struct SystemProcessProbe {
    names: Vec<String>,
}

impl SystemProcessProbe {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(|n| normalize(&n.into())).collect(),
        }
    }

    fn matches(&self, exe_name: &str) -> bool {
        let exe_name = normalize(exe_name);
        self.names.iter().any(|name| *name == exe_name)
    }
}

impl ProcessProbe for SystemProcessProbe {
    fn is_running(&self) -> bool {
        let found = running_process_names().iter().any(|n| self.matches(n));
        debug!("Host process running: {}", found);
        found
    }
}

fn normalize(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    lower.strip_suffix(".exe").unwrap_or(&lower).to_string()
}

#[cfg(target_os = "windows")]
fn running_process_names() -> Vec<String> {
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, PROCESSENTRY32W, Process32FirstW, Process32NextW,
        TH32CS_SNAPPROCESS,
    };

    let mut names = Vec::new();
    // SAFETY: snapshot handle is closed below; entry is a plain struct with dwSize set.
    unsafe {
        let snapshot = match CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) {
            Ok(handle) => handle,
            Err(e) => {
                debug!("Process snapshot failed: {}", e);
                return names;
            }
        };

        let mut entry = PROCESSENTRY32W {
            dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };

        if Process32FirstW(snapshot, &mut entry).is_ok() {
            loop {
                let len = entry
                    .szExeFile
                    .iter()
                    .position(|&c| c == 0)
                    .unwrap_or(entry.szExeFile.len());
                names.push(String::from_utf16_lossy(&entry.szExeFile[..len]));

                if Process32NextW(snapshot, &mut entry).is_err() {
                    break;
                }
            }
        }

        let _ = CloseHandle(snapshot);
    }
    names
}

#[cfg(not(target_os = "windows"))]
fn running_process_names() -> Vec<String> {
    use sysinfo::{ProcessesToUpdate, System};

    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All);

    system
        .processes()
        .values()
        .map(|process| process.name().to_string_lossy().into_owned())
        .collect()
}
