use std::fmt;

use chrono::{DateTime, Utc};

use super::{AdvancedForm, OnDemandForm, TimingDescriptor, TimingError};

type Observer = Box<dyn Fn(&[String]) + Send + Sync>;

/// Remove the first entry equal to `value`. Absent values are ignored.
pub fn delete(list: &mut Vec<String>, value: &str) -> bool {
    match list.iter().position(|item| item == value) {
        Some(index) => {
            list.remove(index);
            true
        }
        None => false,
    }
}

/// Ordered timing strings waiting to be submitted with a job.
///
/// An optional observer is called with the full list after every mutation.
#[derive(Default)]
pub struct PendingTimingList {
    items: Vec<String>,
    observer: Option<Observer>,
}

impl PendingTimingList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(observer: impl Fn(&[String]) + Send + Sync + 'static) -> Self {
        Self {
            items: Vec::new(),
            observer: Some(Box::new(observer)),
        }
    }

    pub fn push(&mut self, timing: impl Into<String>) {
        self.items.push(timing.into());
        self.changed();
    }

    pub fn push_descriptor(&mut self, timing: &TimingDescriptor) -> String {
        let encoded = timing.to_string();
        self.push(encoded.clone());
        encoded
    }

    /// Re-validate the form against `now` and append its timing if addable.
    pub fn add_on_demand(
        &mut self,
        form: &mut OnDemandForm,
        now: DateTime<Utc>,
    ) -> Result<String, TimingError> {
        let status = form.status(now);
        match form.descriptor() {
            Some(timing) if status.addable => Ok(self.push_descriptor(&timing)),
            _ => Err(TimingError::NotAddable(status.message)),
        }
    }

    pub fn add_advanced(
        &mut self,
        form: &mut AdvancedForm,
        now: DateTime<Utc>,
    ) -> Result<String, TimingError> {
        let status = form.status(now);
        match form.descriptor() {
            Some(timing) if status.addable => Ok(self.push_descriptor(&timing)),
            _ => Err(TimingError::NotAddable(status.message)),
        }
    }

    pub fn delete(&mut self, value: &str) -> bool {
        let removed = delete(&mut self.items, value);
        if removed {
            self.changed();
        }
        removed
    }

    pub fn clear(&mut self) {
        if !self.items.is_empty() {
            self.items.clear();
            self.changed();
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn changed(&self) {
        if let Some(observer) = &self.observer {
            observer(&self.items);
        }
    }
}

impl fmt::Debug for PendingTimingList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTimingList")
            .field("items", &self.items)
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::sync::{Arc, Mutex};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_delete_removes_first_match() {
        let mut list = strings(&["a", "b", "c"]);
        assert!(delete(&mut list, "b"));
        assert_eq!(list, strings(&["a", "c"]));

        let mut list = strings(&["a", "b", "a"]);
        delete(&mut list, "a");
        assert_eq!(list, strings(&["b", "a"]));
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let mut list = strings(&["a"]);
        assert!(!delete(&mut list, "x"));
        assert_eq!(list, strings(&["a"]));
    }

    #[test]
    fn test_observer_sees_every_change() {
        let seen: Arc<Mutex<Vec<usize>>> = Arc::default();
        let sink = seen.clone();
        let mut list = PendingTimingList::with_observer(move |items| {
            sink.lock().unwrap().push(items.len());
        });

        list.push("type=on_demand,days=0,hours=1,minutes=0");
        list.push("type=on_demand,days=0,hours=2,minutes=0");
        list.delete("missing");
        list.delete("type=on_demand,days=0,hours=1,minutes=0");
        list.clear();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 1, 0]);
    }

    #[test]
    fn test_add_on_demand_requires_addable_status() {
        let now = Utc::now();
        let mut list = PendingTimingList::new();

        let mut form = OnDemandForm::default();
        assert_eq!(
            list.add_on_demand(&mut form, now),
            Err(TimingError::NotAddable("Expiration date not set".into()))
        );

        form.target = Some(now + TimeDelta::hours(5));
        let added = list.add_on_demand(&mut form, now).unwrap();
        assert_eq!(added, "type=on_demand,days=0,hours=5,minutes=0");
        assert_eq!(list.as_slice(), &[added]);
    }

    #[test]
    fn test_add_advanced_rejects_inverted_window() {
        let now = Utc::now();
        let mut list = PendingTimingList::new();
        let mut form = AdvancedForm::new(now + TimeDelta::hours(3), now + TimeDelta::hours(1));

        let err = list.add_advanced(&mut form, now).unwrap_err();
        assert_eq!(
            err,
            TimingError::NotAddable("Start date must be before end date".into())
        );
        assert!(list.is_empty());
    }

    #[test]
    fn test_added_advanced_timings_parse_back() {
        let now = DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let base = now + TimeDelta::hours(1);
        let mut list = PendingTimingList::new();

        let mut same_second = AdvancedForm::new(
            base + TimeDelta::milliseconds(100),
            base + TimeDelta::milliseconds(900),
        );
        assert_eq!(
            list.add_advanced(&mut same_second, now),
            Err(TimingError::NotAddable(
                "Start date must be before end date".into()
            ))
        );

        let mut straddling = AdvancedForm::new(
            base + TimeDelta::milliseconds(900),
            base + TimeDelta::milliseconds(1_100),
        );
        list.add_advanced(&mut straddling, now).unwrap();
        let mut long = AdvancedForm::new(base, base + TimeDelta::days(2));
        list.add_advanced(&mut long, now).unwrap();

        assert_eq!(list.len(), 2);
        for added in list.as_slice() {
            let parsed: TimingDescriptor = added.parse().unwrap();
            assert_eq!(&parsed.to_string(), added);
        }
    }
}
