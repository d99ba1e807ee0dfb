use super::config::Config;
use super::mocker;
use super::seeds;
use super::workspace::Workspace;
use crate::TestcaseId;
use crate::arena::Arena;
use crate::coverage::Knowledge;
use crate::crash::Analyzer;
use crate::error::Error;
use crate::error::Result;
use crate::exec::Commander;
use crate::exec::Status;
use crate::exec::Template;
use crate::genetic::Evolver;
use crate::genetic::Population;
use crate::trace::Drain;
use crate::trace::Region;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// how many (pid, status) completions the monitor may buffer ahead of the
/// collector
const COMPLETION_QUEUE_DEPTH: usize = 4096;

/// the driver: owns every component and turns the crank. one iteration is
/// generate -> dispatch -> collect -> score -> evolve.
pub struct Fuzzer {
    config: Config,
    workspace: Workspace,
    arena: Arena,
    rng: SmallRng,
    knowledge: Knowledge,
    population: Population,
    evolver: Evolver,
    commander: Option<Arc<Commander>>,
    drain: Option<Drain>,
    analyzer: Arc<Analyzer>,
    next_testcase: TestcaseId,
    generated: u64,
}

// initialization. everything that can fail here is fatal; past this point
// failures degrade to skipped testcases.
impl Fuzzer {
    pub fn new(config: Config) -> Result<Self> {
        let workspace = Workspace::from(config.idir.clone());
        workspace.bootstrap(config.clear_idir)?;

        let mut arena = Arena::default();
        let mut rng = SmallRng::seed_from_u64(config.rand_seed);

        let knowledge = if config.fake_target_call {
            log::info!("fake target calls: using blind knowledge");
            Knowledge::blind(config.rand_seed)
        } else {
            Knowledge::from_file(&config.models)?
        };

        let (commander, drain) = if config.fake_target_call {
            (None, None)
        } else {
            let template = Template::parse(&config.call)?;
            let region = Region::create(crate::TRACE_REGION_NAME).map_err(Error::Region)?;
            let env = config
                .environment
                .as_deref()
                .map(crate::exec::command::parse_env)
                .unwrap_or_default();
            let commander = Commander::new(
                template,
                workspace.inputs(),
                workspace.dumps(),
                env,
                Duration::from_secs(config.target_timeout_seconds),
                config.force_crash_target,
                config.stream_target_stdout,
            );
            (Some(Arc::new(commander)), Some(Drain::from(region)))
        };

        let analyzer = Arc::new(Analyzer::new(workspace.dumps(), workspace.crashes()));

        let seeds = match &config.seeds {
            Some(path) => seeds::load(path, &mut arena)?,
            None => seeds::random(
                &mut rng,
                &mut arena,
                config.population_initial_size,
                config.initial_buffer_size,
                config.initial_buffer_deviation_size,
            ),
        };
        let mut population = Population::from(seeds);
        population.inject_seeds(&mut rng, &mut arena, config.population_initial_size);
        while population.size() < config.population_initial_size {
            // a thin seeds file still has to fill the first generation
            let filler = seeds::random(
                &mut rng,
                &mut arena,
                1,
                config.initial_buffer_size,
                config.initial_buffer_deviation_size,
            );
            population.individuals.extend(filler);
        }

        let evolver = Evolver::new(
            config.population_initial_size,
            config.population_deviation_size,
            config.max_evolution_fixpoint,
            config.slow_mating_strategies,
        );

        Ok(Self {
            config,
            workspace,
            arena,
            rng,
            knowledge,
            population,
            evolver,
            commander,
            drain,
            analyzer,
            next_testcase: 0,
            generated: 0,
        })
    }

    pub fn analyzer(&self) -> Arc<Analyzer> {
        self.analyzer.clone()
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn knowledge(&self) -> &Knowledge {
        &self.knowledge
    }

    pub fn generations(&self) -> u32 {
        self.evolver.generations
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    fn has_more(&self) -> bool {
        self.generated < self.config.max_num_testcases
    }

    fn next_id(&mut self) -> TestcaseId {
        self.next_testcase += 1;
        self.generated += 1;
        self.next_testcase
    }
}

// the background services around the generational loop
impl Fuzzer {
    /// watcher, reaper, and crash pipeline tasks. completions flow to the
    /// collector through the bounded queue.
    pub fn spawn_services(
        &self,
        completions: mpsc::Sender<(i32, Status)>,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        if let Some(commander) = &self.commander {
            let statuses = commander.statuses();
            handles.push(tokio::spawn(async move {
                loop {
                    statuses.scan();
                    tokio::time::sleep(Duration::from_millis(crate::WATCHER_TICK_MILLIS)).await;
                }
            }));
            let statuses = commander.statuses();
            handles.push(tokio::spawn(async move {
                loop {
                    for (pid, status) in statuses.harvest() {
                        if completions.send((pid, status)).await.is_err() {
                            return;
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(crate::WATCHER_TICK_MILLIS)).await;
                }
            }));
        }
        let analyzer = self.analyzer.clone();
        handles.push(tokio::spawn(async move {
            loop {
                analyzer.sweep();
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        }));
        handles
    }

    /// the whole run: loop generations until the testcase budget is spent
    pub async fn run(&mut self) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(COMPLETION_QUEUE_DEPTH);
        let services = self.spawn_services(tx);
        while self.has_more() {
            if self.config.fake_target_call {
                self.step_fake();
            } else {
                self.step_live(&mut rx).await;
            }
        }
        for service in services {
            service.abort();
        }
        if let Some(commander) = &self.commander {
            commander.shutdown();
        }
        if self.drain.is_some() {
            Region::remove(crate::TRACE_REGION_NAME);
        }
        log::info!("done after {} generations", self.evolver.generations);
        Ok(())
    }
}

// one generation
impl Fuzzer {
    /// mocked variant: no processes, traces are synthesized
    pub fn step_fake(&mut self) {
        for index in 0..self.population.individuals.len() {
            let id = self.next_id();
            self.population.individuals[index].id = id;
            let trace = mocker::mock_trace(&mut self.rng);
            self.knowledge.add_trace(id, &trace);
        }
        self.evolve();
    }

    /// live variant: dispatch every individual, collect every trace
    pub async fn step_live(&mut self, completions: &mut mpsc::Receiver<(i32, Status)>) {
        let commander = match &self.commander {
            Some(commander) => commander.clone(),
            None => return,
        };

        // dispatch through a small worker pool, throttled by the
        // live-process ceiling
        let mut jobs = std::collections::VecDeque::new();
        for index in 0..self.population.individuals.len() {
            let id = self.next_id();
            self.population.individuals[index].id = id;
            jobs.push_back((id, self.population.individuals[index].bytes(&self.arena).to_vec()));
        }
        let jobs = Arc::new(std::sync::Mutex::new(jobs));
        let dispatched = Arc::new(std::sync::Mutex::new(Vec::new()));
        let workers = (0..num_cpus::get().clamp(1, 8))
            .map(|_| {
                let jobs = jobs.clone();
                let dispatched = dispatched.clone();
                let commander = commander.clone();
                let ceiling = self.config.max_num_processes;
                tokio::spawn(async move {
                    loop {
                        let job = jobs.lock().unwrap().pop_front();
                        let (id, payload) = match job {
                            Some(job) => job,
                            None => break,
                        };
                        while commander.statuses().live() >= ceiling {
                            tokio::time::sleep(Duration::from_millis(crate::WATCHER_TICK_MILLIS))
                                .await;
                        }
                        if commander.call(id, &payload) {
                            dispatched.lock().unwrap().push(id);
                        } else {
                            log::error!("dispatch failed, skipping testcase {}", id);
                        }
                    }
                })
            })
            .collect::<Vec<_>>();
        futures::future::join_all(workers).await;
        let mut outstanding: BTreeMap<TestcaseId, Option<Instant>> = dispatched
            .lock()
            .unwrap()
            .iter()
            .map(|id| (*id, None))
            .collect();

        // collect until every outstanding trace is complete or synthesized
        let grace = Duration::from_millis(crate::TIMEOUT_GRACE_MILLIS);
        let deadline = Instant::now()
            + Duration::from_secs(self.config.target_timeout_seconds)
            + grace * 10;
        while !outstanding.is_empty() {
            while let Ok((pid, _)) = completions.try_recv() {
                if let Some(testcase) = commander.testcase_of(pid) {
                    if let Some(finished) = outstanding.get_mut(&testcase) {
                        *finished = Some(Instant::now());
                    }
                    commander.processed(pid);
                }
            }
            let drain = self.drain.as_mut().unwrap();
            drain.poll();
            let overdue = Instant::now() > deadline;
            for (testcase, finished) in outstanding.iter() {
                let silent = match finished {
                    Some(finished) => finished.elapsed() > grace,
                    None => false,
                };
                if !drain.is_complete(*testcase) && (silent || overdue) {
                    drain.force_timeout(*testcase);
                }
            }
            let complete = outstanding
                .keys()
                .filter(|testcase| drain.is_complete(**testcase))
                .copied()
                .collect::<Vec<_>>();
            for testcase in complete {
                if let Some(records) = self.drain.as_mut().unwrap().take(testcase) {
                    self.knowledge.add_trace(testcase, &records);
                }
                outstanding.remove(&testcase);
            }
            tokio::time::sleep(Duration::from_millis(crate::WATCHER_TICK_MILLIS)).await;
        }

        self.evolve();
    }

    fn evolve(&mut self) {
        let perturbed = self.evolver.evolve(
            &mut self.rng,
            &mut self.arena,
            &mut self.population,
            &self.knowledge,
        );
        if perturbed {
            log::info!("generation {} was a global perturbation", self.evolver.generations);
        }
        self.knowledge.reset_scores();
        self.population.assign_snapshot(&self.arena);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config(dir: &std::path::Path, extra: &[&str]) -> Config {
        let mut argv = vec![
            "goalfuzz".to_string(),
            "--idir".to_string(),
            dir.join("idir").to_string_lossy().to_string(),
            "--population-initial-size".to_string(),
            "8".to_string(),
            "--population-deviation-size".to_string(),
            "2".to_string(),
            "--rand-seed".to_string(),
            "7".to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        Config::parse_from(argv)
    }

    #[test]
    fn fake_mode_runs_whole_generations() {
        let dir = tempfile::tempdir().unwrap();
        let mut fuzzer = Fuzzer::new(config(dir.path(), &["--fake-target-call"])).unwrap();
        assert_eq!(fuzzer.population().size(), 8);
        for _ in 0..5 {
            fuzzer.step_fake();
        }
        assert_eq!(fuzzer.generations(), 5);
        assert!(fuzzer.population().size() >= 6);
        assert!(!fuzzer.population().best().lock().unwrap().is_empty());
        // every member of every snapshot respects the length invariant
        for shared in fuzzer.population().snapshot().individuals {
            assert!(!shared.bytes.is_empty());
        }
    }

    #[test]
    fn best_set_stays_capped_and_unique() {
        let dir = tempfile::tempdir().unwrap();
        let mut fuzzer = Fuzzer::new(config(dir.path(), &["--fake-target-call"])).unwrap();
        for _ in 0..40 {
            fuzzer.step_fake();
        }
        let best = fuzzer.population().best().lock().unwrap();
        assert!(best.len() <= crate::BEST_CANDIDATES_SIZE);
        assert_eq!(best.hashes().len(), best.len());
    }

    #[test]
    fn live_mode_without_a_template_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Fuzzer::new(config(dir.path(), &[])).is_err());
    }

    #[test]
    fn missing_model_store_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing-model.bin");
        let config = config(
            dir.path(),
            &["--call", "true __INPUT__", "--models", missing.to_str().unwrap()],
        );
        assert!(matches!(Fuzzer::new(config), Err(Error::Model { .. })));
    }

    #[tokio::test]
    async fn uninstrumented_targets_degrade_to_synthesized_timeouts() {
        let dir = tempfile::tempdir().unwrap();
        // a real model store on disk, so initialization succeeds
        let model = dir.path().join("model.bin");
        crate::model::Store::default().save(&model).unwrap();
        let config = config(
            dir.path(),
            &[
                "--call",
                "true __INPUT__",
                "--models",
                model.to_str().unwrap(),
                "--target-timeout-seconds",
                "1",
            ],
        );
        let mut fuzzer = Fuzzer::new(config).unwrap();
        let (tx, mut rx) = mpsc::channel(COMPLETION_QUEUE_DEPTH);
        let services = fuzzer.spawn_services(tx);
        fuzzer.step_live(&mut rx).await;
        for service in services {
            service.abort();
        }
        assert_eq!(fuzzer.generations(), 1);
        // /bin/true emits no trace: every testcase was closed as timed out
        // and still went through scoring and evolution
        assert!(fuzzer.population().size() >= 2);
        Region::remove(crate::TRACE_REGION_NAME);
    }
}
