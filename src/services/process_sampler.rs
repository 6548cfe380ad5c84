use crate::error::{CollectorError, ConfigError};
use crate::models::{ProcessSample, ServiceObservation, ServiceSpec};
use crate::services::process_checker::{select_main_process, ProcessMatcher};
use chrono::Utc;
use std::sync::{Mutex, TryLockError};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

/// 按服务匹配规则读取进程表
///
/// `System` 在 tick 之间复用，CPU 使用率是两次刷新之间的差值。
pub struct ProcessSampler {
    system: Mutex<System>,
    services: Vec<(ServiceSpec, ProcessMatcher)>,
    own_pid: u32,
}

struct Candidate {
    pid: i32,
    ppid: Option<i32>,
    cpu: f32,
    memory: u64,
}

impl ProcessSampler {
    pub fn new(services: &[ServiceSpec]) -> Result<Self, ConfigError> {
        let services = services
            .iter()
            .map(|spec| Ok((spec.clone(), ProcessMatcher::new(spec)?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            system: Mutex::new(System::new()),
            services,
            own_pid: std::process::id(),
        })
    }

    /// 采样所有配置的服务，顺序与配置一致
    pub fn sample(&self) -> Result<Vec<ServiceObservation>, CollectorError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(CollectorError::process_table("platform not supported by sysinfo"));
        }

        // 超时的采样任务可能仍持有锁，不在这里排队等待
        let mut sys = match self.system.try_lock() {
            Ok(sys) => sys,
            Err(TryLockError::WouldBlock) => return Err(CollectorError::Busy { collector: "process" }),
            Err(TryLockError::Poisoned(_)) => {
                return Err(CollectorError::process_table("process cache lock poisoned"))
            }
        };

        sys.refresh_memory();
        let refreshed = sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_cpu()
                .with_memory()
                .with_cmd(UpdateKind::OnlyIfNotSet),
        );
        if refreshed == 0 || sys.processes().is_empty() {
            return Err(CollectorError::process_table("process table is empty (insufficient permissions?)"));
        }

        let total_memory = sys.total_memory();
        let observed_at = Utc::now();

        let mut observations = Vec::with_capacity(self.services.len());
        for (spec, matcher) in &self.services {
            let mut candidates = Vec::new();

            for (pid, process) in sys.processes() {
                // Linux 下线程也会出现在进程表中
                if process.thread_kind().is_some() || pid.as_u32() == self.own_pid {
                    continue;
                }

                let cmd: Vec<String> = process
                    .cmd()
                    .iter()
                    .map(|s| s.to_string_lossy().into_owned())
                    .collect();
                let name = process.name().to_string_lossy();

                if matcher.is_match(&cmd, &name) {
                    candidates.push(Candidate {
                        pid: pid.as_u32() as i32,
                        ppid: process.parent().map(|p| p.as_u32() as i32),
                        cpu: process.cpu_usage(),
                        memory: process.memory(),
                    });
                }
            }

            let pairs: Vec<(i32, Option<i32>)> = candidates.iter().map(|c| (c.pid, c.ppid)).collect();
            let sample = select_main_process(&pairs)
                .and_then(|main| candidates.iter().find(|c| c.pid == main))
                .map(|c| ProcessSample {
                    service_name: spec.name.clone(),
                    pid: c.pid,
                    parent_pid: c.ppid,
                    cpu_percent: c.cpu,
                    mem_percent: memory_percent(c.memory, total_memory),
                    memory_bytes: c.memory,
                    observed_at,
                });

            log::debug!(
                "Service '{}': {} matching process(es), main PID {:?}",
                spec.name,
                candidates.len(),
                sample.as_ref().map(|s| s.pid)
            );

            observations.push(ServiceObservation {
                service: spec.name.clone(),
                sample,
                match_count: candidates.len(),
            });
        }

        Ok(observations)
    }
}

#[cfg(test)]
impl ProcessSampler {
    /// 模拟一次卡住的采样
    pub(crate) fn hold_cache(&self) -> std::sync::MutexGuard<'_, System> {
        self.system.lock().unwrap()
    }
}

fn memory_percent(memory: u64, total_memory: u64) -> f32 {
    if total_memory > 0 {
        ((memory as f64 / total_memory as f64) * 100.0) as f32
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchStrategy;

    #[test]
    fn test_memory_percent() {
        assert_eq!(memory_percent(0, 0), 0.0);
        assert_eq!(memory_percent(512, 1024), 50.0);
        assert!((memory_percent(1, 3) - 33.333).abs() < 0.01);
    }

    #[test]
    fn test_no_match_is_down_not_error() {
        let spec = ServiceSpec::new("ghost", "no-such-process-f3a9c1", 10.0);
        let sampler = ProcessSampler::new(&[spec]).unwrap();

        let observations = sampler.sample().unwrap();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].service, "ghost");
        assert!(!observations[0].is_running());
        assert_eq!(observations[0].match_count, 0);
    }

    #[test]
    fn test_never_matches_itself() {
        // 测试进程自身的命令行一定包含测试二进制名
        let exe = std::env::current_exe().unwrap();
        let own_name = exe.file_name().unwrap().to_string_lossy().into_owned();
        let spec = ServiceSpec::new("self", &regex::escape(&own_name), 10.0)
            .with_strategy(MatchStrategy::Regex);
        let sampler = ProcessSampler::new(&[spec]).unwrap();

        let observations = sampler.sample().unwrap();
        if let Some(sample) = &observations[0].sample {
            assert_ne!(sample.pid as u32, std::process::id());
        }
    }

    #[test]
    fn test_overlapping_samples_fail_fast() {
        let spec = ServiceSpec::new("ghost", "no-such-process-f3a9c1", 10.0);
        let sampler = std::sync::Arc::new(ProcessSampler::new(&[spec]).unwrap());
        let held = sampler.hold_cache();

        let (tx, rx) = std::sync::mpsc::channel();
        for _ in 0..5 {
            let sampler = std::sync::Arc::clone(&sampler);
            let tx = tx.clone();
            std::thread::spawn(move || {
                let _ = tx.send(sampler.sample());
            });
        }

        for _ in 0..5 {
            let result = rx
                .recv_timeout(std::time::Duration::from_secs(2))
                .expect("sample should not wait for the held cache");
            assert!(matches!(result, Err(CollectorError::Busy { collector: "process" })));
        }

        drop(held);
        assert!(sampler.sample().is_ok());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_finds_child_process() {
        let marker = format!("sampler-test-marker-{}", std::process::id());
        let mut child = std::process::Command::new("sh")
            .arg("-c")
            .arg(format!("sleep 30; : {}", marker))
            .spawn()
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(200));

        let sampler = ProcessSampler::new(&[ServiceSpec::new("child", &marker, 10.0)]).unwrap();
        let observations = sampler.sample().unwrap();
        child.kill().ok();
        child.wait().ok();

        let sample = observations[0].sample.as_ref().expect("child process should be found");
        assert_eq!(sample.pid as u32, child.id());
        assert_eq!(sample.service_name, "child");
        assert!(sample.mem_percent >= 0.0);
    }
}
