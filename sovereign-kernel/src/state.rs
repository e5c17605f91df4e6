use parking_lot::Mutex;
use std::sync::Arc;

/// État des panneaux, du shell et du tracker : tout passe par cet alias.
pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_state_is_visible_through_clones() {
        let a = new_state(1u32);
        let b = a.clone();
        *b.lock() += 41;
        assert_eq!(*a.lock(), 42);
    }
}
