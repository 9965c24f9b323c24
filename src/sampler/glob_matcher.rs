// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

const CACHE_CAPACITY: usize = 256;

/// Case-insensitive glob matching with `*` (any run of characters,
/// including none) and `?` (exactly one character).
///
/// Results are memoized per subject in an LRU cache since the same span
/// names and services recur heavily.
pub(crate) struct GlobMatcher {
    pattern: String,
    pattern_lower: String,
    cache: Mutex<LruCache<String, bool>>,
}

impl fmt::Debug for GlobMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobMatcher")
            .field("pattern", &self.pattern)
            .finish()
    }
}

impl GlobMatcher {
    pub(crate) fn new(pattern: &str) -> Self {
        GlobMatcher {
            pattern: pattern.to_string(),
            pattern_lower: pattern.to_lowercase(),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).unwrap(),
            )),
        }
    }

    pub(crate) fn matches(&self, subject: &str) -> bool {
        let subject_lower = subject.to_lowercase();
        if let Some(&hit) = self.cache.lock().unwrap().get(&subject_lower) {
            return hit;
        }
        let result = glob_match(self.pattern_lower.as_bytes(), subject_lower.as_bytes());
        self.cache.lock().unwrap().put(subject_lower, result);
        result
    }
}

impl Clone for GlobMatcher {
    fn clone(&self) -> Self {
        // Each clone gets a fresh cache.
        GlobMatcher::new(&self.pattern)
    }
}

/// Iterative backtracking matcher. On a mismatch it resumes at the most
/// recent `*`, letting it swallow one more subject byte.
fn glob_match(pattern: &[u8], subject: &[u8]) -> bool {
    let mut px = 0;
    let mut sx = 0;
    let mut star_px = 0;
    let mut star_sx = 0;

    while px < pattern.len() || sx < subject.len() {
        if px < pattern.len() {
            match pattern[px] {
                b'*' => {
                    star_px = px;
                    star_sx = sx + 1;
                    px += 1;
                    continue;
                }
                b'?' if sx < subject.len() => {
                    px += 1;
                    sx += 1;
                    continue;
                }
                c if sx < subject.len() && subject[sx] == c => {
                    px += 1;
                    sx += 1;
                    continue;
                }
                _ => {}
            }
        }
        if star_sx > 0 && star_sx <= subject.len() {
            px = star_px;
            sx = star_sx;
            continue;
        }
        return false;
    }
    true
}
