// bslice - Backward Slicing Toolkit
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Warnings about calls into code that was not traced.

use std::{collections::HashSet, fmt};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Signature of an invoked method
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSignature {
    /// Owner in internal form, e.g. `java/lang/String`
    pub owner: String,
    /// Method name
    pub name: String,
    /// Method descriptor, e.g. `(I)V`
    pub descriptor: String,
}

impl MethodSignature {
    /// Create a signature
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self { owner: owner.into(), name: name.into(), descriptor: descriptor.into() }
    }

    /// Owner with `.` separators
    pub fn owner_name(&self) -> String {
        self.owner.replace('/', ".")
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} {}", self.owner_name(), self.name, self.descriptor)
    }
}

/// Reports each untraced method once
///
/// A call site is looked at only the first time it is seen; a method is
/// reported only the first time any call site reaches it.
#[derive(Debug, Default)]
pub struct UntracedCallReporter {
    seen_call_sites: HashSet<usize>,
    reported: HashSet<MethodSignature>,
}

impl UntracedCallReporter {
    /// Create a reporter that has seen nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Note an untraced call at instruction `call_site`
    ///
    /// Returns whether a warning was emitted.
    pub fn report(&mut self, call_site: usize, method: &MethodSignature) -> bool {
        if !self.seen_call_sites.insert(call_site) {
            return false;
        }
        if self.reported.contains(method) {
            return false;
        }
        warn!("Untraced method {method}");
        self.reported.insert(method.clone());
        true
    }

    /// Methods reported so far
    pub fn reported(&self) -> impl Iterator<Item = &MethodSignature> {
        self.reported.iter()
    }

    /// Number of methods reported so far
    pub fn reported_count(&self) -> usize {
        self.reported.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deduplicates_by_call_site_and_method() {
        let mut reporter = UntracedCallReporter::new();
        let hash = MethodSignature::new("java/lang/Object", "hashCode", "()I");
        let print = MethodSignature::new("java/io/PrintStream", "println", "(I)V");

        assert!(reporter.report(10, &hash));
        assert!(!reporter.report(10, &hash));
        // another call site reaching a reported method stays quiet
        assert!(!reporter.report(11, &hash));
        assert!(reporter.report(12, &print));
        assert_eq!(reporter.reported_count(), 2);
    }

    #[test]
    fn test_display_uses_dotted_owner() {
        let sig = MethodSignature::new("java/lang/String", "length", "()I");
        assert_eq!(sig.to_string(), "java.lang.String.length ()I");
    }
}
