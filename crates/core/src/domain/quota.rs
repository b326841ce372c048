use std::fmt;
use std::ops::{Add, Mul};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::directory::GroupId;
use crate::errors::QuotaError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaResource {
    CpuCnt,
    MemSize,
    DiskSize,
    VmCnt,
    Rate,
}

impl QuotaResource {
    pub const ALL: [QuotaResource; 5] =
        [Self::CpuCnt, Self::MemSize, Self::DiskSize, Self::VmCnt, Self::Rate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CpuCnt => "cpu_cnt",
            Self::MemSize => "mem_size",
            Self::DiskSize => "disk_size",
            Self::VmCnt => "vm_cnt",
            Self::Rate => "rate",
        }
    }
}

impl fmt::Display for QuotaResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource footprint. Negative values are allowed so decommission items can
/// release capacity when the net usage of an order is computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu_cnt: Decimal,
    pub mem_size: Decimal,
    pub disk_size: Decimal,
    pub vm_cnt: Decimal,
    pub rate: Decimal,
}

impl ResourceUsage {
    pub fn get(&self, resource: QuotaResource) -> Decimal {
        match resource {
            QuotaResource::CpuCnt => self.cpu_cnt,
            QuotaResource::MemSize => self.mem_size,
            QuotaResource::DiskSize => self.disk_size,
            QuotaResource::VmCnt => self.vm_cnt,
            QuotaResource::Rate => self.rate,
        }
    }

    pub fn negated(self) -> Self {
        Self {
            cpu_cnt: -self.cpu_cnt,
            mem_size: -self.mem_size,
            disk_size: -self.disk_size,
            vm_cnt: -self.vm_cnt,
            rate: -self.rate,
        }
    }
}

impl Add for ResourceUsage {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            cpu_cnt: self.cpu_cnt + other.cpu_cnt,
            mem_size: self.mem_size + other.mem_size,
            disk_size: self.disk_size + other.disk_size,
            vm_cnt: self.vm_cnt + other.vm_cnt,
            rate: self.rate + other.rate,
        }
    }
}

impl Mul<u32> for ResourceUsage {
    type Output = Self;

    fn mul(self, factor: u32) -> Self {
        let factor = Decimal::from(factor);
        Self {
            cpu_cnt: self.cpu_cnt * factor,
            mem_size: self.mem_size * factor,
            disk_size: self.disk_size * factor,
            vm_cnt: self.vm_cnt * factor,
            rate: self.rate * factor,
        }
    }
}

/// Per-resource ceilings; `None` means unlimited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu_cnt: Option<Decimal>,
    pub mem_size: Option<Decimal>,
    pub disk_size: Option<Decimal>,
    pub vm_cnt: Option<Decimal>,
    pub rate: Option<Decimal>,
}

impl ResourceLimits {
    pub fn get(&self, resource: QuotaResource) -> Option<Decimal> {
        match resource {
            QuotaResource::CpuCnt => self.cpu_cnt,
            QuotaResource::MemSize => self.mem_size,
            QuotaResource::DiskSize => self.disk_size,
            QuotaResource::VmCnt => self.vm_cnt,
            QuotaResource::Rate => self.rate,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSet {
    pub group_id: GroupId,
    pub limits: ResourceLimits,
    pub used: ResourceUsage,
}

impl QuotaSet {
    pub fn unlimited(group_id: GroupId) -> Self {
        Self { group_id, limits: ResourceLimits::default(), used: ResourceUsage::default() }
    }

    pub fn available(&self, resource: QuotaResource) -> Option<Decimal> {
        self.limits.get(resource).map(|limit| limit - self.used.get(resource))
    }

    /// Checks whether `requested` fits under every limit. Only positive
    /// deltas are checked; releasing capacity always fits.
    pub fn can_use(&self, requested: &ResourceUsage) -> Result<(), QuotaError> {
        for resource in QuotaResource::ALL {
            let delta = requested.get(resource);
            if delta <= Decimal::ZERO {
                continue;
            }

            if let Some(available) = self.available(resource) {
                if delta > available {
                    return Err(QuotaError::Exceeded {
                        group: self.group_id.clone(),
                        resource,
                        requested: delta,
                        available,
                    });
                }
            }
        }

        Ok(())
    }

    /// `can_use` followed by adding `requested` to `used`. Nothing changes
    /// when the check fails.
    pub fn consume(&mut self, requested: &ResourceUsage) -> Result<(), QuotaError> {
        self.can_use(requested)?;
        self.used = self.used + *requested;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{QuotaResource, QuotaSet, ResourceLimits, ResourceUsage};
    use crate::domain::directory::GroupId;
    use crate::errors::QuotaError;

    fn quota() -> QuotaSet {
        QuotaSet {
            group_id: GroupId("eng".to_string()),
            limits: ResourceLimits {
                cpu_cnt: Some(Decimal::from(16)),
                vm_cnt: Some(Decimal::from(4)),
                ..ResourceLimits::default()
            },
            used: ResourceUsage {
                cpu_cnt: Decimal::from(10),
                vm_cnt: Decimal::from(3),
                ..ResourceUsage::default()
            },
        }
    }

    #[test]
    fn usage_within_limits_is_allowed() {
        let requested = ResourceUsage {
            cpu_cnt: Decimal::from(6),
            vm_cnt: Decimal::ONE,
            mem_size: Decimal::from(512),
            ..ResourceUsage::default()
        };

        assert!(quota().can_use(&requested).is_ok());
    }

    #[test]
    fn usage_over_limit_names_the_resource() {
        let requested = ResourceUsage {
            cpu_cnt: Decimal::from(2),
            vm_cnt: Decimal::from(2),
            ..ResourceUsage::default()
        };

        let error = quota().can_use(&requested).expect_err("vm_cnt should be exceeded");
        assert!(matches!(
            error,
            QuotaError::Exceeded { resource: QuotaResource::VmCnt, available, .. }
                if available == Decimal::ONE
        ));
    }

    #[test]
    fn released_capacity_never_violates_quota() {
        let requested = ResourceUsage {
            cpu_cnt: Decimal::from(-40),
            vm_cnt: Decimal::from(-1),
            ..ResourceUsage::default()
        };

        assert!(quota().can_use(&requested).is_ok());
    }

    #[test]
    fn consuming_moves_usage_until_the_limit_is_reached() {
        let mut quota = quota();
        let one_vm = ResourceUsage { vm_cnt: Decimal::ONE, ..ResourceUsage::default() };

        quota.consume(&one_vm).expect("last vm fits");
        assert_eq!(quota.used.vm_cnt, Decimal::from(4));
        assert_eq!(quota.available(QuotaResource::VmCnt), Some(Decimal::ZERO));

        let error = quota.consume(&one_vm).expect_err("no headroom left");
        assert!(matches!(error, QuotaError::Exceeded { resource: QuotaResource::VmCnt, .. }));
        assert_eq!(quota.used.vm_cnt, Decimal::from(4));

        quota.consume(&one_vm.negated()).expect("release always fits");
        assert_eq!(quota.used.vm_cnt, Decimal::from(3));
    }

    #[test]
    fn usage_arithmetic_scales_and_negates() {
        let unit = ResourceUsage { cpu_cnt: Decimal::from(2), ..ResourceUsage::default() };
        let total = unit * 3 + unit.negated();

        assert_eq!(total.cpu_cnt, Decimal::from(4));
    }
}
