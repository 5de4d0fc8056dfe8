use std::time::Instant;

use metrics::{counter, histogram, Label};
use num_traits::cast;
use tracing::error;

pub struct HistogramKey {
    key: &'static str,
}

macro_rules! create_label_struct {
    ($struct_name:ident, { $($field_name:ident : $field_type:ty),+ $(,)? }) => {
        pub struct $struct_name {
            $(pub $field_name: $field_type),+
        }

        impl From<$struct_name> for Vec<Label> {
            fn from(val: $struct_name) -> Self {
                vec![
                    $(Label::new(stringify!($field_name), val.$field_name)),+
                ]
            }
        }
    };
}

create_label_struct!(StatsLabels, {
    app: String,
});
pub static STATS_REQUEST_METRIC: DeltaMetric<StatsLabels> = DeltaMetric {
    elapsed: &HistogramKey {
        key: "stats_request_elapsed_sec",
    },
    phantom: std::marker::PhantomData,
};

pub struct DeltaMetric<L> {
    elapsed: &'static HistogramKey,
    phantom: std::marker::PhantomData<L>,
}

impl<L: Into<Vec<Label>>> DeltaMetric<L> {
    pub fn create(&self, labels: L) -> DeltaMetricImpl {
        DeltaMetricImpl {
            elapsed: self.elapsed,
            now: Instant::now(),
            labels: labels.into(),
        }
    }
}

/// Records the elapsed time when dropped.
pub struct DeltaMetricImpl {
    elapsed: &'static HistogramKey,
    now: Instant,
    labels: Vec<Label>,
}

impl Drop for DeltaMetricImpl {
    fn drop(&mut self) {
        let elapsed = self.now.elapsed();
        let histogram = histogram!(self.elapsed.key, self.labels.clone());
        histogram.record(elapsed.as_secs_f64());
    }
}

pub struct Counter<Labels> {
    key: &'static str,
    phantom: std::marker::PhantomData<Labels>,
}
impl<Labels: Into<Vec<Label>>> Counter<Labels> {
    pub fn create(&self, labels: Labels) -> CounterImpl {
        CounterImpl {
            key: self.key,
            labels: labels.into(),
        }
    }
}
pub struct CounterImpl {
    key: &'static str,
    labels: Vec<Label>,
}
impl CounterImpl {
    pub fn increment_by(self, value: usize) {
        if let Some(value) = cast::<usize, u64>(value) {
            let counter = counter!(self.key, self.labels);
            counter.increment(value);
        } else {
            error!("Failed to cast value to u64");
        }
    }
}

create_label_struct!(DroppedEventsLabels, {
    app: String,
    kind: &'static str,
});
pub static DROPPED_EVENTS_COUNTER: Counter<DroppedEventsLabels> = Counter {
    key: "stats_dropped_events_counter",
    phantom: std::marker::PhantomData,
};
