use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// A point in time. All instants in this crate are UTC wall-clock values.
pub type Instant = DateTime<Utc>;

/// A half-open time interval `[start, end)` with possibly-unbounded sides.
///
/// A `None` start extends the period infinitely into the past; a `None`
/// end extends it infinitely into the future. A period with both sides
/// `None` covers all time.
///
/// # Examples
///
/// Using the builder pattern:
/// ```rust,ignore
/// let bounded = Period::builder().start(t0).end(t1).build();
/// let open_ended = Period::builder().start(t0).build();
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(default))]
pub struct Period {
  /// Inclusive start of the period; `None` means unbounded on the left.
  #[builder(default, setter(into, strip_option))]
  pub start: Option<Instant>,
  /// Exclusive end of the period; `None` means unbounded on the right.
  #[builder(default, setter(into, strip_option))]
  pub end: Option<Instant>,
}

impl Period {
  /// Create a period bounded on both sides.
  pub fn bounded(start: Instant, end: Instant) -> Self {
    Period {
      start: Some(start),
      end: Some(end),
    }
  }

  /// Create a period from `start` extending infinitely into the future.
  pub fn starting_at(start: Instant) -> Self {
    Period {
      start: Some(start),
      end: None,
    }
  }

  /// Create a period extending from the infinite past up to `end`.
  pub fn ending_at(end: Instant) -> Self {
    Period {
      start: None,
      end: Some(end),
    }
  }

  /// Create the degenerate period that covers all time.
  pub fn all_time() -> Self {
    Period {
      start: None,
      end: None,
    }
  }

  /// Returns true if `t` falls within the period.
  ///
  /// Containment is inclusive on the start and exclusive on the end; an
  /// unbounded side drops the corresponding comparison, so a period with
  /// both sides unbounded contains every instant.
  pub fn contains_time(&self, t: Instant) -> bool {
    let after_start = self.start.is_none_or(|s| s <= t);
    let before_end = self.end.is_none_or(|e| t < e);
    after_start && before_end
  }

  /// End-inclusive variant of [`Period::contains_time`].
  ///
  /// Calendar producers use this when the end of a window should count as
  /// part of the window.
  pub fn contains_time_inclusive(&self, t: Instant) -> bool {
    let after_start = self.start.is_none_or(|s| s <= t);
    let at_or_before_end = self.end.is_none_or(|e| t <= e);
    after_start && at_or_before_end
  }

  /// Returns true if this period and `other` share any time.
  ///
  /// Overlap is strict: `max(start, other.start) < min(end, other.end)`,
  /// with an unbounded side dropping its comparison. Two periods that
  /// merely touch (`a.end == b.start`) do not intersect.
  pub fn intersects(&self, other: &Period) -> bool {
    let starts_before_other_ends = match (self.start, other.end) {
      (Some(s), Some(e)) => s < e,
      _ => true,
    };
    let other_starts_before_self_ends = match (other.start, self.end) {
      (Some(s), Some(e)) => s < e,
      _ => true,
    };
    starts_before_other_ends && other_starts_before_self_ends
  }

  /// Returns true if `other` lies entirely within this period.
  ///
  /// Containment is inclusive on both ends. An unbounded side of `self`
  /// contains anything on that side; an unbounded side of `other` is only
  /// contained when the corresponding side of `self` is unbounded too.
  pub fn contains(&self, other: &Period) -> bool {
    let start_ok = match (self.start, other.start) {
      (None, _) => true,
      (Some(_), None) => false,
      (Some(a), Some(b)) => a <= b,
    };
    let end_ok = match (self.end, other.end) {
      (None, _) => true,
      (Some(_), None) => false,
      (Some(a), Some(b)) => b <= a,
    };
    start_ok && end_ok
  }

  /// The overlapping portion of two periods, or `None` when they do not
  /// intersect. Unbounded sides carry through: the intersection of two
  /// right-open periods is itself right-open.
  pub fn intersection(&self, other: &Period) -> Option<Period> {
    if !self.intersects(other) {
      return None;
    }
    let start = match (self.start, other.start) {
      (Some(a), Some(b)) => Some(a.max(b)),
      (Some(a), None) | (None, Some(a)) => Some(a),
      (None, None) => None,
    };
    let end = match (self.end, other.end) {
      (Some(a), Some(b)) => Some(a.min(b)),
      (Some(a), None) | (None, Some(a)) => Some(a),
      (None, None) => None,
    };
    Some(Period { start, end })
  }

  /// Search-key ordering used by the tree: true iff this period sorts
  /// strictly before `other` by start instant. An unbounded start sorts
  /// ahead of every bounded start; equal starts are not "before" (ties go
  /// right in the tree).
  pub(crate) fn starts_before(&self, other: &Period) -> bool {
    match (self.start, other.start) {
      (None, None) => false,
      (None, Some(_)) => true,
      (Some(_), None) => false,
      (Some(a), Some(b)) => a < b,
    }
  }
}

/// Subtree augmentation: the maximum period end within a subtree.
///
/// `Unbounded` means some period in the subtree has no end instant and the
/// subtree therefore reaches infinitely into the future. The derived order
/// places `Unbounded` above every bounded value, so `max` combines values
/// the way query pruning expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MaxEnd {
  Bounded(Instant),
  Unbounded,
}

impl MaxEnd {
  /// Returns true if some end in the subtree lies strictly after `t`.
  ///
  /// This is the pruning predicate: a subtree whose `max_end` does not
  /// exceed `t` cannot contain a period that is still open at `t`.
  pub fn exceeds(&self, t: Instant) -> bool {
    match self {
      MaxEnd::Bounded(e) => *e > t,
      MaxEnd::Unbounded => true,
    }
  }
}

impl From<Option<Instant>> for MaxEnd {
  fn from(end: Option<Instant>) -> Self {
    match end {
      Some(e) => MaxEnd::Bounded(e),
      None => MaxEnd::Unbounded,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  fn base() -> Instant {
    DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
      .unwrap()
      .with_timezone(&Utc)
  }

  fn secs(s: i64) -> Instant {
    base() + Duration::seconds(s)
  }

  #[test]
  fn contains_time_is_half_open() {
    let p = Period::bounded(secs(10), secs(20));

    assert!(p.contains_time(secs(10)));
    assert!(p.contains_time(secs(19)));
    assert!(!p.contains_time(secs(20)));
    assert!(!p.contains_time(secs(9)));

    // End-inclusive variant admits the end instant itself
    assert!(p.contains_time_inclusive(secs(20)));
    assert!(!p.contains_time_inclusive(secs(21)));
  }

  #[test]
  fn contains_time_unbounded_sides() {
    let no_start = Period::ending_at(secs(20));
    assert!(no_start.contains_time(secs(-1_000_000)));
    assert!(!no_start.contains_time(secs(20)));

    let no_end = Period::starting_at(secs(10));
    assert!(no_end.contains_time(secs(1_000_000)));
    assert!(!no_end.contains_time(secs(9)));

    let all = Period::all_time();
    assert!(all.contains_time(secs(-1_000_000)));
    assert!(all.contains_time(secs(1_000_000)));
  }

  #[test]
  fn intersects_is_strict_on_endpoints() {
    let a = Period::bounded(secs(0), secs(10));
    let b = Period::bounded(secs(10), secs(20));
    let c = Period::bounded(secs(5), secs(15));

    // Touching intervals do not intersect
    assert!(!a.intersects(&b));
    assert!(!b.intersects(&a));

    assert!(a.intersects(&c));
    assert!(c.intersects(&b));
    assert!(a.intersects(&a));
  }

  #[test]
  fn intersects_with_unbounded_sides() {
    let open_right = Period::starting_at(secs(100));
    let open_left = Period::ending_at(secs(50));
    let bounded = Period::bounded(secs(40), secs(60));

    assert!(open_right.intersects(&Period::bounded(secs(150), secs(160))));
    assert!(!open_right.intersects(&bounded));
    assert!(open_left.intersects(&bounded));
    assert!(!open_left.intersects(&Period::bounded(secs(50), secs(60))));

    // Two periods open on opposite sides always share the middle
    assert!(open_left.intersects(&Period::ending_at(secs(10))));
    assert!(open_right.intersects(&Period::starting_at(secs(500))));
    assert!(Period::all_time().intersects(&bounded));
  }

  #[test]
  fn contains_is_inclusive_on_both_ends() {
    let outer = Period::bounded(secs(0), secs(100));

    assert!(outer.contains(&Period::bounded(secs(0), secs(100))));
    assert!(outer.contains(&Period::bounded(secs(10), secs(90))));
    assert!(!outer.contains(&Period::bounded(secs(10), secs(101))));
    assert!(!outer.contains(&Period::starting_at(secs(10))));

    let open = Period::starting_at(secs(0));
    assert!(open.contains(&Period::starting_at(secs(5))));
    assert!(open.contains(&Period::bounded(secs(5), secs(10))));
    assert!(!open.contains(&Period::ending_at(secs(10))));
    assert!(Period::all_time().contains(&Period::all_time()));
  }

  #[test]
  fn intersection_clamps_to_the_overlap() {
    let a = Period::bounded(secs(0), secs(10));
    let b = Period::bounded(secs(5), secs(15));

    assert_eq!(a.intersection(&b), Some(Period::bounded(secs(5), secs(10))));
    assert_eq!(b.intersection(&a), Some(Period::bounded(secs(5), secs(10))));

    // Touching periods have no intersection
    assert_eq!(a.intersection(&Period::bounded(secs(10), secs(20))), None);

    // Unbounded sides carry through
    let open_right = Period::starting_at(secs(3));
    assert_eq!(
      a.intersection(&open_right),
      Some(Period::bounded(secs(3), secs(10)))
    );
    assert_eq!(
      open_right.intersection(&Period::starting_at(secs(7))),
      Some(Period::starting_at(secs(7)))
    );
    assert_eq!(
      Period::all_time().intersection(&a),
      Some(a)
    );
  }

  #[test]
  fn starts_before_orders_unbounded_first() {
    let open = Period::ending_at(secs(5));
    let early = Period::bounded(secs(1), secs(5));
    let late = Period::bounded(secs(2), secs(5));

    assert!(open.starts_before(&early));
    assert!(!early.starts_before(&open));
    assert!(early.starts_before(&late));

    // Ties are not "before": they land in the right subtree
    assert!(!early.starts_before(&Period::bounded(secs(1), secs(9))));
    assert!(!open.starts_before(&Period::all_time()));
  }

  #[test]
  fn max_end_order_and_exceeds() {
    let lo = MaxEnd::Bounded(secs(10));
    let hi = MaxEnd::Bounded(secs(20));

    assert!(lo < hi);
    assert!(hi < MaxEnd::Unbounded);
    assert_eq!(lo.max(hi), hi);
    assert_eq!(hi.max(MaxEnd::Unbounded), MaxEnd::Unbounded);

    assert!(hi.exceeds(secs(19)));
    assert!(!hi.exceeds(secs(20)));
    assert!(MaxEnd::Unbounded.exceeds(secs(1_000_000)));

    assert_eq!(MaxEnd::from(None), MaxEnd::Unbounded);
    assert_eq!(MaxEnd::from(Some(secs(3))), MaxEnd::Bounded(secs(3)));
  }

  #[test]
  fn builder_strips_options() {
    let p = Period::builder().start(secs(1)).end(secs(2)).build();
    assert_eq!(p, Period::bounded(secs(1), secs(2)));

    let open = Period::builder().start(secs(1)).build();
    assert_eq!(open, Period::starting_at(secs(1)));

    assert_eq!(Period::builder().build(), Period::all_time());
  }

  #[test]
  fn period_serde_tokens() {
    use serde_test::{Configure, Token};

    // Fixed string representations so the token stream can be static
    let start_str = "2025-01-01T00:00:00Z";
    let end_str = "2025-01-01T01:00:00Z";

    let start = DateTime::parse_from_rfc3339(start_str)
      .unwrap()
      .with_timezone(&Utc);
    let end = DateTime::parse_from_rfc3339(end_str)
      .unwrap()
      .with_timezone(&Utc);
    let p = Period::bounded(start, end);

    // Mark the value as readable so DateTime serializes as an RFC 3339
    // string in the token stream.
    serde_test::assert_tokens(
      &p.readable(),
      &[
        Token::Struct {
          name: "Period",
          len: 2,
        },
        Token::Str("start"),
        Token::Some,
        Token::Str(start_str),
        Token::Str("end"),
        Token::Some,
        Token::Str(end_str),
        Token::StructEnd,
      ],
    );

    serde_test::assert_tokens(
      &Period::starting_at(start).readable(),
      &[
        Token::Struct {
          name: "Period",
          len: 2,
        },
        Token::Str("start"),
        Token::Some,
        Token::Str(start_str),
        Token::Str("end"),
        Token::None,
        Token::StructEnd,
      ],
    );
  }
}
