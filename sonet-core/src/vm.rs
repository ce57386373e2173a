//! The VM context: owns every piece of runtime state and drives the event
//! loop.

use std::{
    collections::HashMap,
    fs,
    path::{Component, Path, PathBuf},
    rc::Rc,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use rand::{rngs::StdRng, SeedableRng};
use sonet_nls::Codec;

use crate::{
    audio::AudioSystem,
    config::{ConfigError, VmConfig},
    error::Result,
    script::{
        interpreter::{Flow, StackFrame},
        FunctionDef, Instruction, Program, Scope, Value,
    },
    subsystem::{
        components::builtins::BuiltinRegistry,
        resources::{
            event_queue::{Event, EventKind, EventQueue},
            file_table::FileTable,
            handler::{HandlerId, Poll, RunOutcome},
            handler_registry::HandlerRegistry,
        },
    },
};

const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Names under which event parameters are visible to handlers.
pub const EVENT_PARAM_NAMES: [&str; 4] = ["MesP1", "MesP2", "MesP3", "MesP4"];

/// Cooperative stop request shared across threads.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Vm {
    pub(crate) config: VmConfig,
    pub(crate) main: Rc<Vec<Instruction>>,
    pub(crate) file: Option<String>,
    pub(crate) functions: HashMap<String, Rc<FunctionDef>>,
    pub(crate) globals: Rc<Scope>,
    pub(crate) frames: Vec<StackFrame>,
    pub(crate) builtins: BuiltinRegistry,
    pub(crate) handlers: HandlerRegistry,
    pub(crate) events: EventQueue,
    pub(crate) files: FileTable,
    pub(crate) audio: Box<dyn AudioSystem>,
    pub(crate) codec: Codec,
    pub(crate) current_handler: Option<HandlerId>,
    /// Step multiplier for code running outside any handler.
    pub(crate) step_counter: i64,
    pub(crate) pending_wait: Option<i64>,
    /// Offset of the top-level instruction being executed.
    pub(crate) pc: usize,
    cancel: CancelToken,
    deadline: Option<Instant>,
    rng: StdRng,
}

impl Vm {
    pub fn new(
        program: Program,
        config: VmConfig,
        mut audio: Box<dyn AudioSystem>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let functions = program
            .collect_functions()
            .into_iter()
            .map(|(name, def)| (name, Rc::new(def)))
            .collect::<HashMap<_, _>>();
        log::debug!(
            "loaded {} top-level instructions, {} functions",
            program.instructions.len(),
            functions.len()
        );

        if config.headless {
            audio.mute(true);
        }
        let codec = Codec::new(config.encoding);

        Ok(Self {
            config,
            main: Rc::new(program.instructions),
            file: program.file,
            functions,
            globals: Scope::global(),
            frames: Vec::new(),
            builtins: BuiltinRegistry::with_defaults(),
            handlers: HandlerRegistry::new(),
            events: EventQueue::new(),
            files: FileTable::new(),
            audio,
            codec,
            current_handler: None,
            step_counter: 1,
            pending_wait: None,
            pc: 0,
            cancel: CancelToken::new(),
            deadline: None,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn globals(&self) -> &Rc<Scope> {
        &self.globals
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get_local(name)
    }

    pub fn set_global(&self, name: &str, value: Value) {
        self.globals.set_local(name, value);
    }

    pub fn builtins_mut(&mut self) -> &mut BuiltinRegistry {
        &mut self.builtins
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn handlers_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.handlers
    }

    /// Handler whose body is executing right now, if any.
    pub fn current_handler(&self) -> Option<HandlerId> {
        self.current_handler
    }

    pub fn files_mut(&mut self) -> &mut FileTable {
        &mut self.files
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn audio(&self) -> &dyn AudioSystem {
        self.audio.as_ref()
    }

    pub fn audio_mut(&mut self) -> &mut dyn AudioSystem {
        self.audio.as_mut()
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn seed_rng(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn post_event(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Ask the loop to stop at the next check point.
    pub fn stop(&self) {
        log::info!("stop requested");
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn should_stop(&self) -> bool {
        if self.cancel.is_cancelled() {
            return true;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                log::info!("timeout reached, stopping");
                self.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Resolve a script-supplied file name: backslashes become separators,
    /// relative names are taken from the base directory, and a missing path
    /// is retried component by component ignoring case.
    pub fn resolve_path(&self, name: &str) -> PathBuf {
        let normalized = name.replace('\\', "/");
        let path = Path::new(&normalized);
        let full = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.base_dir.join(path)
        };
        if full.exists() {
            return full;
        }
        find_ignoring_case(&full)
    }

    pub(crate) fn register_handler(&mut self, kind: EventKind, body: Rc<Vec<Instruction>>) -> HandlerId {
        let id = self.handlers.register(kind, body);
        if kind == EventKind::Time {
            self.ensure_timer();
        }
        id
    }

    fn ensure_timer(&mut self) {
        if !self.audio.timer_running() {
            log::debug!("starting timer at {} ticks/s", self.config.tick_rate);
            self.audio.start_timer();
        }
    }

    /// Execute `body` from `start` until it ends or suspends.
    fn run_body(&mut self, body: &[Instruction], start: usize) -> Result<RunOutcome> {
        for (pc, inst) in body.iter().enumerate().skip(start) {
            if self.should_stop() {
                return Ok(RunOutcome::Suspended { pc, wait: 0 });
            }
            self.pc = pc;
            match self.exec_instruction(inst) {
                Ok(Flow::Normal(_)) => {}
                Ok(Flow::Wait(wait)) => return Ok(RunOutcome::Suspended { pc: pc + 1, wait }),
                Ok(Flow::Return(_)) => return Ok(RunOutcome::Completed),
                Ok(Flow::Break | Flow::Continue) => {
                    log::debug!("break/continue outside of a loop ignored");
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => log::error!("{e}"),
            }
            // del_me and friends retire the running handler on the spot
            let retired = self
                .current_handler
                .and_then(|id| self.handlers.get(id))
                .is_some_and(|h| h.marked_for_deletion);
            if retired {
                return Ok(RunOutcome::Completed);
            }
        }
        Ok(RunOutcome::Completed)
    }

    /// Run the top-level program once. A wait at top level parks the rest
    /// of the program as a one-shot TIME handler.
    pub fn run_program(&mut self) -> Result<()> {
        let main = self.main.clone();
        let outcome = self.run_body(&main, 0)?;
        if self.is_stopped() {
            return Ok(());
        }
        if let RunOutcome::Suspended { pc, wait } = outcome {
            let id = self.register_handler(EventKind::Time, main);
            if let Some(handler) = self.handlers.get_mut(id) {
                handler.current_pc = pc;
                handler.wait_counter = wait;
                handler.has_step_block = true;
                handler.step_counter = self.step_counter;
            }
            log::debug!("main program parked as handler #{id} (pc {pc}, wait {wait})");
        }
        Ok(())
    }

    fn publish_params(&self, params: &[Value]) {
        for (i, name) in EVENT_PARAM_NAMES.iter().enumerate() {
            let value = params.get(i).cloned().unwrap_or(Value::Int(0));
            self.globals.set_local(name, value);
        }
    }

    /// Offer `event` to every handler of its category, in registration order,
    /// then sweep retired handlers.
    pub fn dispatch(&mut self, event: Event) -> Result<()> {
        log::trace!("dispatch {}", event.kind);
        self.publish_params(&event.params);

        for id in self.handlers.ids_for(event.kind) {
            if self.should_stop() {
                break;
            }
            let Some(handler) = self.handlers.get_mut(id) else {
                continue;
            };
            let pc = match handler.poll() {
                Poll::Run { pc } => pc,
                Poll::Skip | Poll::Waiting { .. } => continue,
            };
            let body = handler.body.clone();

            self.current_handler = Some(id);
            let result = self.run_body(&body, pc);
            self.current_handler = None;

            let outcome = result?;
            if let Some(handler) = self.handlers.get_mut(id) {
                handler.finish(outcome);
            }
        }

        let removed = self.handlers.sweep();
        if removed > 0 {
            log::debug!("{removed} handler(s) retired after {}", event.kind);
        }
        Ok(())
    }

    /// Dispatch one queued event. Returns false when the queue was empty.
    pub fn pump(&mut self) -> Result<bool> {
        match self.events.pop() {
            Some(event) => {
                self.dispatch(event)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run the program, then the event loop until no handlers remain, the
    /// token is cancelled or the timeout elapses.
    pub fn run(&mut self) -> Result<()> {
        self.deadline = self.config.timeout.map(|t| Instant::now() + t);
        let result = self.run_loop();
        self.shutdown();
        result
    }

    fn run_loop(&mut self) -> Result<()> {
        self.run_program()?;
        loop {
            if self.should_stop() {
                break;
            }
            if self.handlers.is_empty() {
                log::info!("no handlers left, leaving event loop");
                break;
            }
            for kind in self.audio.update() {
                self.events.push(Event::new(kind));
            }
            if !self.pump()? {
                thread::sleep(IDLE_SLEEP);
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.files.close_all();
        self.audio.stop_timer();
        self.audio.shutdown();
        self.events.clear();
    }
}

fn find_ignoring_case(path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        let Component::Normal(name) = component else {
            resolved.push(component.as_os_str());
            continue;
        };
        let candidate = resolved.join(name);
        if candidate.exists() {
            resolved = candidate;
            continue;
        }
        let wanted = name.to_string_lossy().to_lowercase();
        let dir = if resolved.as_os_str().is_empty() {
            Path::new(".")
        } else {
            resolved.as_path()
        };
        let found = fs::read_dir(dir).ok().and_then(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name())
                .find(|n| n.to_string_lossy().to_lowercase() == wanted)
        });
        match found {
            Some(actual) => resolved.push(actual),
            None => resolved.push(name),
        }
    }
    resolved
}
