//! Role and capability types for marketplace access control.
//!
//! Every profile carries exactly one [`Role`]. What a role may do is looked up
//! in a static capability table rather than compared as strings at call sites,
//! so an unknown role can never silently grant or deny access.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marketplace role of a profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A candidate looking for work.
    #[default]
    #[serde(alias = "candidate")]
    Jobseeker,
    /// A company posting its own listings.
    #[serde(alias = "client")]
    Employer,
    /// A staffing agency posting on behalf of clients.
    Agency,
    /// Platform operator.
    Admin,
}

impl Role {
    /// All roles, in declaration order.
    pub const ALL: [Role; 4] = [Role::Jobseeker, Role::Employer, Role::Agency, Role::Admin];

    /// Returns the canonical lowercase name of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jobseeker => "jobseeker",
            Self::Employer => "employer",
            Self::Agency => "agency",
            Self::Admin => "admin",
        }
    }

    /// Returns true if this role has admin privileges.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Returns true for roles that publish job listings.
    #[must_use]
    pub fn is_hiring(&self) -> bool {
        matches!(self, Self::Employer | Self::Agency)
    }

    /// Returns the capabilities granted by this role.
    #[must_use]
    pub fn capabilities(&self) -> CapabilitySet {
        use Capability::*;

        match self {
            Self::Jobseeker => CapabilitySet::from_slice(&[
                ApplyToJobs,
                SaveJobs,
                MessageEmployers,
                WriteReviews,
            ]),
            Self::Employer => CapabilitySet::from_slice(&[
                PostJobs,
                ViewApplicants,
                MessageCandidates,
                WriteReviews,
            ]),
            Self::Agency => CapabilitySet::from_slice(&[
                PostJobs,
                ViewApplicants,
                MessageCandidates,
                ManageClients,
                WriteReviews,
            ]),
            Self::Admin => CapabilitySet::all(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a role name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole {
    /// The rejected input.
    pub value: String,
}

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role: {}", self.value)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jobseeker" | "candidate" => Ok(Self::Jobseeker),
            "employer" | "client" => Ok(Self::Employer),
            "agency" => Ok(Self::Agency),
            "admin" => Ok(Self::Admin),
            _ => Err(UnknownRole {
                value: s.to_string(),
            }),
        }
    }
}

/// A single permission checked by feature modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Submit an application to a listing.
    ApplyToJobs,
    /// Bookmark a listing.
    SaveJobs,
    /// Start a conversation with a hiring party.
    MessageEmployers,
    /// Start a conversation with a candidate.
    MessageCandidates,
    /// Publish a job listing.
    PostJobs,
    /// See applications to own listings.
    ViewApplicants,
    /// Manage client companies (agencies).
    ManageClients,
    /// Leave a review of an employer or candidate.
    WriteReviews,
    /// Moderate listings and reviews.
    ModeratePlatform,
    /// Change other users' roles and flags.
    ManageUsers,
    /// Promote listings to the featured slot.
    FeaturedListings,
    /// Access listing and profile analytics.
    ViewAnalytics,
}

impl Capability {
    /// All capabilities, in declaration order.
    pub const ALL: [Capability; 12] = [
        Capability::ApplyToJobs,
        Capability::SaveJobs,
        Capability::MessageEmployers,
        Capability::MessageCandidates,
        Capability::PostJobs,
        Capability::ViewApplicants,
        Capability::ManageClients,
        Capability::WriteReviews,
        Capability::ModeratePlatform,
        Capability::ManageUsers,
        Capability::FeaturedListings,
        Capability::ViewAnalytics,
    ];

    /// Capabilities unlocked by the premium flag regardless of role.
    pub const PREMIUM: [Capability; 2] = [Capability::FeaturedListings, Capability::ViewAnalytics];

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ApplyToJobs => "apply_to_jobs",
            Self::SaveJobs => "save_jobs",
            Self::MessageEmployers => "message_employers",
            Self::MessageCandidates => "message_candidates",
            Self::PostJobs => "post_jobs",
            Self::ViewApplicants => "view_applicants",
            Self::ManageClients => "manage_clients",
            Self::WriteReviews => "write_reviews",
            Self::ModeratePlatform => "moderate_platform",
            Self::ManageUsers => "manage_users",
            Self::FeaturedListings => "featured_listings",
            Self::ViewAnalytics => "view_analytics",
        };
        f.write_str(name)
    }
}

/// Set of capabilities held by a profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CapabilitySet {
    bits: u16,
}

impl CapabilitySet {
    /// Creates an empty capability set.
    #[must_use]
    pub const fn none() -> Self {
        Self { bits: 0 }
    }

    /// Creates a set holding every capability.
    #[must_use]
    pub fn all() -> Self {
        Self::from_slice(&Capability::ALL)
    }

    /// Creates a set from a list of capabilities.
    #[must_use]
    pub fn from_slice(capabilities: &[Capability]) -> Self {
        let bits = capabilities.iter().fold(0, |acc, c| acc | c.bit());
        Self { bits }
    }

    /// Returns a copy with the given capability added.
    #[must_use]
    pub fn with(mut self, capability: Capability) -> Self {
        self.bits |= capability.bit();
        self
    }

    /// Returns the union of two sets.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    /// Returns true if the set holds the capability.
    #[must_use]
    pub fn contains(&self, capability: Capability) -> bool {
        self.bits & capability.bit() != 0
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Iterates over the held capabilities in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Self::none(), Self::with)
    }
}
