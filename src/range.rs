//! Subresource rectangle types and arithmetic (spec §3, §4.1 "Rectangle
//! arithmetic").

/// One bound of a `RangeSpec` axis. Lower and upper bounds are asymmetric:
/// `From(v)` as an upper bound means "unbounded above `v`"; `UpTo(v)` as a
/// lower bound means "from zero up to `v`"; `All` is unbounded in whichever
/// direction it's used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Exact(u32),
    From(u32),
    UpTo(u32),
    All,
}

impl Bound {
    /// Resolve this bound as a *lower* bound against a concrete axis count.
    fn resolve_lower(self, count: u32) -> u32 {
        match self {
            Bound::Exact(v) => v.min(count),
            Bound::From(v) => v.min(count),
            Bound::UpTo(_) => 0,
            Bound::All => 0,
        }
    }

    /// Resolve this bound as an *upper* bound (exclusive) against a concrete
    /// axis count.
    fn resolve_upper(self, count: u32) -> u32 {
        match self {
            Bound::Exact(v) => (v + 1).min(count),
            Bound::From(_) => count,
            Bound::UpTo(v) => v.min(count),
            Bound::All => count,
        }
    }
}

/// Symbolic, resource-agnostic specification of a subresource rectangle:
/// four independent bounds over the mip and array-slice axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub mip_lower: Bound,
    pub mip_upper: Bound,
    pub slice_lower: Bound,
    pub slice_upper: Bound,
}

impl RangeSpec {
    pub fn all() -> Self {
        Self {
            mip_lower: Bound::All,
            mip_upper: Bound::All,
            slice_lower: Bound::All,
            slice_upper: Bound::All,
        }
    }

    pub fn mip(index: u32) -> Self {
        Self {
            mip_lower: Bound::Exact(index),
            mip_upper: Bound::Exact(index),
            slice_lower: Bound::All,
            slice_upper: Bound::All,
        }
    }

    pub fn mips(lower: u32, upper_inclusive: u32) -> Self {
        Self {
            mip_lower: Bound::Exact(lower),
            mip_upper: Bound::Exact(upper_inclusive),
            slice_lower: Bound::All,
            slice_upper: Bound::All,
        }
    }

    /// Resolve against a resource's `(total_mips, total_slices)`. Empty if
    /// either axis count is zero.
    pub fn resolve(&self, total_mips: u32, total_slices: u32) -> SubresourceRange {
        if total_mips == 0 || total_slices == 0 {
            return SubresourceRange::EMPTY;
        }
        let first_mip = self.mip_lower.resolve_lower(total_mips);
        let mip_end = self.mip_upper.resolve_upper(total_mips).max(first_mip);
        let first_slice = self.slice_lower.resolve_lower(total_slices);
        let slice_end = self.slice_upper.resolve_upper(total_slices).max(first_slice);
        SubresourceRange {
            first_mip,
            mip_count: mip_end - first_mip,
            first_slice,
            slice_count: slice_end - first_slice,
        }
    }
}

/// Concrete resolution of a `RangeSpec` against one resource's dimensions:
/// a `[first_mip, first_mip + mip_count) x [first_slice, first_slice +
/// slice_count)` rectangle. `mip_count == 0` or `slice_count == 0` denotes
/// the empty rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubresourceRange {
    pub first_mip: u32,
    pub mip_count: u32,
    pub first_slice: u32,
    pub slice_count: u32,
}

impl SubresourceRange {
    pub const EMPTY: Self = Self {
        first_mip: 0,
        mip_count: 0,
        first_slice: 0,
        slice_count: 0,
    };

    pub fn full(total_mips: u32, total_slices: u32) -> Self {
        Self {
            first_mip: 0,
            mip_count: total_mips,
            first_slice: 0,
            slice_count: total_slices,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mip_count == 0 || self.slice_count == 0
    }

    pub fn mip_end(&self) -> u32 {
        self.first_mip + self.mip_count
    }

    pub fn slice_end(&self) -> u32 {
        self.first_slice + self.slice_count
    }

    /// Per-axis `max(lower, lower)` .. `min(upper, upper)` intersection.
    pub fn intersect(&self, other: &SubresourceRange) -> SubresourceRange {
        if self.is_empty() || other.is_empty() {
            return SubresourceRange::EMPTY;
        }
        let first_mip = self.first_mip.max(other.first_mip);
        let mip_end = self.mip_end().min(other.mip_end());
        let first_slice = self.first_slice.max(other.first_slice);
        let slice_end = self.slice_end().min(other.slice_end());
        if mip_end <= first_mip || slice_end <= first_slice {
            return SubresourceRange::EMPTY;
        }
        SubresourceRange {
            first_mip,
            mip_count: mip_end - first_mip,
            first_slice,
            slice_count: slice_end - first_slice,
        }
    }

    pub fn overlaps(&self, other: &SubresourceRange) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Subtract `cut` from `self`, producing up to four non-overlapping
    /// remainder rectangles: two mip strips (below/above the cut's mip
    /// range, spanning the full slice range of `self`) and two slice strips
    /// (below/above the cut's slice range, confined to the mip range shared
    /// with `cut`). Empty strips are dropped.
    pub fn subtract(&self, cut: &SubresourceRange) -> Vec<SubresourceRange> {
        if self.is_empty() {
            return Vec::new();
        }
        let inter = self.intersect(cut);
        if inter.is_empty() {
            return vec![*self];
        }

        let mut out = Vec::with_capacity(4);

        // Mip strip below the cut (full slice range of self).
        if self.first_mip < inter.first_mip {
            out.push(SubresourceRange {
                first_mip: self.first_mip,
                mip_count: inter.first_mip - self.first_mip,
                first_slice: self.first_slice,
                slice_count: self.slice_count,
            });
        }
        // Mip strip above the cut (full slice range of self).
        if self.mip_end() > inter.mip_end() {
            out.push(SubresourceRange {
                first_mip: inter.mip_end(),
                mip_count: self.mip_end() - inter.mip_end(),
                first_slice: self.first_slice,
                slice_count: self.slice_count,
            });
        }
        // Slice strip below the cut, confined to the intersected mip range.
        if self.first_slice < inter.first_slice {
            out.push(SubresourceRange {
                first_mip: inter.first_mip,
                mip_count: inter.mip_count,
                first_slice: self.first_slice,
                slice_count: inter.first_slice - self.first_slice,
            });
        }
        // Slice strip above the cut, confined to the intersected mip range.
        if self.slice_end() > inter.slice_end() {
            out.push(SubresourceRange {
                first_mip: inter.first_mip,
                mip_count: inter.mip_count,
                first_slice: inter.slice_end(),
                slice_count: self.slice_end() - inter.slice_end(),
            });
        }

        out.into_iter().filter(|r| !r.is_empty()).collect()
    }

    /// Two ranges merge along the slice axis iff they share the mip axis
    /// exactly and are touching-or-overlapping on slices (and symmetrically
    /// for the mip axis). Returns the union when mergeable.
    pub fn try_merge(&self, other: &SubresourceRange) -> Option<SubresourceRange> {
        if self.is_empty() || other.is_empty() {
            return None;
        }
        if self.first_mip == other.first_mip
            && self.mip_count == other.mip_count
            && Self::touching_or_overlapping(
                self.first_slice,
                self.slice_end(),
                other.first_slice,
                other.slice_end(),
            )
        {
            let first_slice = self.first_slice.min(other.first_slice);
            let slice_end = self.slice_end().max(other.slice_end());
            return Some(SubresourceRange {
                first_mip: self.first_mip,
                mip_count: self.mip_count,
                first_slice,
                slice_count: slice_end - first_slice,
            });
        }
        if self.first_slice == other.first_slice
            && self.slice_count == other.slice_count
            && Self::touching_or_overlapping(
                self.first_mip,
                self.mip_end(),
                other.first_mip,
                other.mip_end(),
            )
        {
            let first_mip = self.first_mip.min(other.first_mip);
            let mip_end = self.mip_end().max(other.mip_end());
            return Some(SubresourceRange {
                first_mip,
                mip_count: mip_end - first_mip,
                first_slice: self.first_slice,
                slice_count: self.slice_count,
            });
        }
        None
    }

    fn touching_or_overlapping(a_start: u32, a_end: u32, b_start: u32, b_end: u32) -> bool {
        a_start <= b_end && b_start <= a_end
    }

    /// Lexicographic `(slice_lower, slice_upper, mip_lower, mip_upper)`
    /// ordering used to sort segments before sweep-merging.
    pub fn sort_key(&self) -> (u32, u32, u32, u32) {
        (
            self.first_slice,
            self.slice_end(),
            self.first_mip,
            self.mip_end(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_all_covers_full_resource() {
        let r = RangeSpec::all().resolve(8, 6);
        assert_eq!(r, SubresourceRange::full(8, 6));
    }

    #[test]
    fn resolve_with_zero_axis_is_empty() {
        assert!(RangeSpec::all().resolve(0, 6).is_empty());
        assert!(RangeSpec::all().resolve(8, 0).is_empty());
    }

    #[test]
    fn from_as_upper_bound_is_unbounded() {
        let spec = RangeSpec {
            mip_lower: Bound::Exact(2),
            mip_upper: Bound::From(2),
            slice_lower: Bound::All,
            slice_upper: Bound::All,
        };
        let r = spec.resolve(8, 1);
        assert_eq!(r.first_mip, 2);
        assert_eq!(r.mip_count, 6);
    }

    #[test]
    fn upto_as_lower_bound_is_from_zero() {
        let spec = RangeSpec {
            mip_lower: Bound::UpTo(3),
            mip_upper: Bound::Exact(3),
            slice_lower: Bound::All,
            slice_upper: Bound::All,
        };
        let r = spec.resolve(8, 1);
        assert_eq!(r.first_mip, 0);
        assert_eq!(r.mip_count, 4);
    }

    #[test]
    fn intersect_disjoint_is_empty() {
        let a = SubresourceRange {
            first_mip: 0,
            mip_count: 1,
            first_slice: 0,
            slice_count: 1,
        };
        let b = SubresourceRange {
            first_mip: 1,
            mip_count: 1,
            first_slice: 0,
            slice_count: 1,
        };
        assert!(a.intersect(&b).is_empty());
    }

    #[test]
    fn subtract_full_cut_yields_nothing() {
        let full = SubresourceRange::full(4, 4);
        assert!(full.subtract(&full).is_empty());
    }

    #[test]
    fn subtract_center_mip_yields_two_mip_strips() {
        let full = SubresourceRange::full(4, 1);
        let cut = SubresourceRange {
            first_mip: 1,
            mip_count: 1,
            first_slice: 0,
            slice_count: 1,
        };
        let rem = full.subtract(&cut);
        assert_eq!(rem.len(), 2);
        assert!(rem.contains(&SubresourceRange {
            first_mip: 0,
            mip_count: 1,
            first_slice: 0,
            slice_count: 1
        }));
        assert!(rem.contains(&SubresourceRange {
            first_mip: 2,
            mip_count: 2,
            first_slice: 0,
            slice_count: 1
        }));
    }

    #[test]
    fn merge_adjacent_slices_same_mip() {
        let a = SubresourceRange {
            first_mip: 0,
            mip_count: 1,
            first_slice: 0,
            slice_count: 2,
        };
        let b = SubresourceRange {
            first_mip: 0,
            mip_count: 1,
            first_slice: 2,
            slice_count: 2,
        };
        let merged = a.try_merge(&b).unwrap();
        assert_eq!(merged.first_slice, 0);
        assert_eq!(merged.slice_count, 4);
    }

    #[test]
    fn merge_refuses_mismatched_mip_axis() {
        let a = SubresourceRange {
            first_mip: 0,
            mip_count: 1,
            first_slice: 0,
            slice_count: 2,
        };
        let b = SubresourceRange {
            first_mip: 1,
            mip_count: 2,
            first_slice: 2,
            slice_count: 2,
        };
        assert!(a.try_merge(&b).is_none());
    }
}
