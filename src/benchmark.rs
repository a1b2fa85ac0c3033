//! Peer-group averages over a leaderboard.
//!
//! A metric only counts towards an average when it is strictly positive, so
//! people who do not use a service do not drag the group average down. An
//! average with no qualifying member is `None`.

use std::collections::BTreeSet;

use crate::model::{Benchmarks, GitStats, LeaderboardEntry, MetricAverages, ReviewStats};

const CONTRACTOR: &str = "contractor";
const LEVELS: [&str; 4] = ["p1", "p2", "p3", "p4"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Metric {
    Created,
    Reviews,
    Comments,
    CommentsPerMonth,
    Velocity,
    StoryPoints,
    Resolved,
    AvgResolutionTime,
    CtoiFixed,
    CtoiParticipated,
}

const METRICS: usize = 10;

/// One entry's value for every metric, indexed by [`Metric`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Sample([f64; METRICS]);

impl Sample {
    fn of(entry: &LeaderboardEntry) -> Sample {
        let github = entry.github.as_ref();
        let gitlab = entry.gitlab.as_ref();
        let reviews = entry.review_stats.as_ref();
        let github_reviews = reviews.and_then(|r| r.github.as_ref());
        let gitlab_reviews = reviews.and_then(|r| r.gitlab.as_ref());

        let created = created(github) + created(gitlab);
        let review_count = review_field(github_reviews, github, |r| r.reviews, |s| s.reviews)
            + review_field(gitlab_reviews, gitlab, |r| r.reviews, |s| s.reviews);
        let comments = review_field(github_reviews, github, |r| r.comments, |s| s.comments)
            + review_field(gitlab_reviews, gitlab, |r| r.comments, |s| s.comments);

        let months: BTreeSet<&str> = github
            .into_iter()
            .chain(gitlab)
            .flat_map(|s| s.monthly.iter().map(|m| m.month.as_str()))
            .collect();
        let comments_per_month = if months.is_empty() {
            0.0
        } else {
            comments / months.len() as f64
        };

        let jira = entry.jira.as_ref();
        let velocity = jira
            .and_then(|j| j.velocity.as_ref())
            .and_then(|v| {
                v.combined_average_velocity
                    .filter(|combined| *combined > 0.0)
                    .or(v.average_velocity)
            })
            .unwrap_or(0.0);

        let mut sample = Sample::default();
        sample.set(Metric::Created, created);
        sample.set(Metric::Reviews, review_count);
        sample.set(Metric::Comments, comments);
        sample.set(Metric::CommentsPerMonth, comments_per_month);
        sample.set(Metric::Velocity, velocity);
        sample.set(
            Metric::StoryPoints,
            jira.and_then(|j| j.story_points).unwrap_or(0.0),
        );
        sample.set(
            Metric::Resolved,
            jira.and_then(|j| j.resolved).unwrap_or(0) as f64,
        );
        sample.set(
            Metric::AvgResolutionTime,
            jira.and_then(|j| j.avg_resolution_time).unwrap_or(0.0),
        );
        sample.set(
            Metric::CtoiFixed,
            jira.and_then(|j| j.ctoi_fixed).unwrap_or(0) as f64,
        );
        sample.set(
            Metric::CtoiParticipated,
            jira.and_then(|j| j.ctoi_participated).unwrap_or(0) as f64,
        );
        sample
    }

    fn set(&mut self, metric: Metric, value: f64) {
        self.0[metric as usize] = value;
    }
}

fn created(stats: Option<&GitStats>) -> f64 {
    stats.and_then(|s| s.created.or(s.total)).unwrap_or(0) as f64
}

/// Dedicated review stats win over the legacy fields of the stats payload.
fn review_field(
    reviews: Option<&ReviewStats>,
    stats: Option<&GitStats>,
    dedicated: fn(&ReviewStats) -> u64,
    legacy: fn(&GitStats) -> Option<u64>,
) -> f64 {
    reviews
        .map(dedicated)
        .or_else(|| stats.and_then(legacy))
        .unwrap_or(0) as f64
}

#[derive(Debug, Default)]
struct Accumulator {
    sum: [f64; METRICS],
    count: [u32; METRICS],
}

impl Accumulator {
    fn add(&mut self, sample: &Sample) {
        for (i, value) in sample.0.iter().enumerate() {
            if *value > 0.0 {
                self.sum[i] += value;
                self.count[i] += 1;
            }
        }
    }

    fn average(&self, metric: Metric) -> Option<f64> {
        let i = metric as usize;
        (self.count[i] > 0).then(|| round1(self.sum[i] / f64::from(self.count[i])))
    }

    fn averages(&self) -> MetricAverages {
        MetricAverages {
            created: self.average(Metric::Created),
            reviews: self.average(Metric::Reviews),
            comments: self.average(Metric::Comments),
            comments_per_month: self.average(Metric::CommentsPerMonth),
            velocity: self.average(Metric::Velocity),
            story_points: self.average(Metric::StoryPoints),
            resolved: self.average(Metric::Resolved),
            avg_resolution_time: self.average(Metric::AvgResolutionTime),
            ctoi_fixed: self.average(Metric::CtoiFixed),
            ctoi_participated: self.average(Metric::CtoiParticipated),
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Index into [`LEVELS`] of the bucket an entry belongs to, if any.
/// Contractors never land in a level bucket.
fn level_bucket(level: Option<&str>) -> Option<usize> {
    let level = level?.trim().to_ascii_lowercase();
    if level.contains(CONTRACTOR) {
        return None;
    }
    LEVELS.iter().position(|bucket| *bucket == level)
}

/// `fte` averages over everyone; `p1`..`p4` over the matching level.
pub fn compute(entries: &[LeaderboardEntry]) -> Benchmarks {
    let mut fte = Accumulator::default();
    let mut levels: [Accumulator; 4] = Default::default();
    for entry in entries {
        let sample = Sample::of(entry);
        fte.add(&sample);
        if let Some(bucket) = level_bucket(entry.user.level.as_deref()) {
            levels[bucket].add(&sample);
        }
    }
    let [p1, p2, p3, p4] = levels.map(|acc| acc.averages());
    Benchmarks {
        fte: fte.averages(),
        p1,
        p2,
        p3,
        p4,
    }
}
