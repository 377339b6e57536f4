use log::debug;

/// Holds a set of resources that is either fully built or absent.
///
/// `init` only stores the resources when the whole build succeeded. Whatever a failed
/// build created is released by the build itself as its locals go out of scope.
pub struct Lifecycle<R> {
    resources: Option<R>,
}

impl<R> Default for Lifecycle<R> {
    fn default() -> Self {
        Self { resources: None }
    }
}

impl<R> Lifecycle<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.resources.is_some()
    }

    pub fn get(&self) -> Option<&R> {
        self.resources.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut R> {
        self.resources.as_mut()
    }

    /// Builds the resources unless they already exist. Returns whether a build ran.
    pub fn init<E>(&mut self, build: impl FnOnce() -> Result<R, E>) -> Result<bool, E> {
        if self.resources.is_some() {
            debug!("already initialized");
            return Ok(false);
        }
        self.resources = Some(build()?);
        Ok(true)
    }

    /// Releases the resources after `before_release` ran on them.
    /// Returns false when there was nothing to release.
    pub fn destroy(&mut self, before_release: impl FnOnce(&R)) -> bool {
        match self.resources.take() {
            Some(resources) => {
                before_release(&resources);
                drop(resources);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<&'static str>>>;

    struct Tracked {
        name: &'static str,
        log: Log,
    }

    impl Tracked {
        fn new(name: &'static str, log: &Log) -> Self {
            log.borrow_mut().push(name);
            Self {
                name,
                log: log.clone(),
            }
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.log.borrow_mut().push(self.name);
        }
    }

    // declared in reverse creation order
    struct Resources {
        _third: Tracked,
        _second: Tracked,
        _first: Tracked,
    }

    fn build(log: &Log, fail_at: Option<usize>) -> Result<Resources, String> {
        let check = |stage: usize| match fail_at {
            Some(failing) if failing == stage => Err(format!("stage {stage} failed")),
            _ => Ok(()),
        };
        check(0)?;
        let first = Tracked::new("first", log);
        check(1)?;
        let second = Tracked::new("second", log);
        check(2)?;
        let third = Tracked::new("third", log);
        check(3)?;
        Ok(Resources {
            _third: third,
            _second: second,
            _first: first,
        })
    }

    #[test]
    fn destroy_releases_in_reverse_creation_order() {
        let log = Log::default();
        let mut lifecycle = Lifecycle::new();

        assert_eq!(lifecycle.init(|| build(&log, None)), Ok(true));
        assert!(lifecycle.is_initialized());
        assert!(lifecycle.get_mut().is_some());

        assert!(lifecycle.destroy(|_| log.borrow_mut().push("idle")));
        assert_eq!(
            *log.borrow(),
            vec!["first", "second", "third", "idle", "third", "second", "first"]
        );
        assert!(!lifecycle.is_initialized());
    }

    #[test]
    fn failed_init_unwinds_what_was_created() {
        let log = Log::default();
        let mut lifecycle = Lifecycle::new();

        assert!(lifecycle.init(|| build(&log, Some(2))).is_err());
        assert!(!lifecycle.is_initialized());
        assert_eq!(*log.borrow(), vec!["first", "second", "second", "first"]);

        // nothing left behind for destroy
        assert!(!lifecycle.destroy(|_| log.borrow_mut().push("idle")));
        assert_eq!(log.borrow().len(), 4);
    }

    #[test]
    fn destroy_is_idempotent() {
        let log = Log::default();
        let mut lifecycle = Lifecycle::new();
        lifecycle.init(|| build(&log, None)).unwrap();

        assert!(lifecycle.destroy(|_| {}));
        let released = log.borrow().len();
        assert!(!lifecycle.destroy(|_| panic!("nothing to release")));
        assert_eq!(log.borrow().len(), released);
    }

    #[test]
    fn init_twice_keeps_the_first_resources() {
        let log = Log::default();
        let mut lifecycle = Lifecycle::new();
        lifecycle.init(|| build(&log, None)).unwrap();

        assert_eq!(lifecycle.init(|| build(&log, None)), Ok(false));
        assert_eq!(log.borrow().len(), 3);
    }

    #[test]
    fn destroy_without_init_does_nothing() {
        let mut lifecycle: Lifecycle<Resources> = Lifecycle::new();
        assert!(!lifecycle.destroy(|_| panic!("nothing to release")));
    }
}
