#![cfg_attr(not(feature = "std"), no_std, no_main)]

pub type Balance = u128;
pub type RedeemableId = u32;

pub mod constants {
    /// Block timestamps are milliseconds; buy and redeem dates are Unix seconds.
    pub const MILLIS_PER_SECOND: u64 = 1_000;
}

/// Linear price curve shared by the shop and its callers.
///
/// The price of the next unit of a species is
/// `base_price + increment * units_sold`. Every helper returns `None`
/// on overflow instead of wrapping.
pub mod pricing {
    use crate::Balance;

    /// Price of the next unit after `units_sold` paid purchases.
    pub fn unit_price(base_price: Balance, increment: Balance, units_sold: u64) -> Option<Balance> {
        increment
            .checked_mul(Balance::from(units_sold))?
            .checked_add(base_price)
    }

    /// Total cost of `quantity` back-to-back purchases starting after
    /// `units_sold` units, with the parameters held fixed.
    ///
    /// ```text
    ///   sum_{i = sold}^{sold + quantity - 1} (base + increment * i)
    ///     = quantity * base + increment * (quantity * sold + quantity * (quantity - 1) / 2)
    /// ```
    pub fn batch_cost(
        base_price: Balance,
        increment: Balance,
        units_sold: u64,
        quantity: u64,
    ) -> Option<Balance> {
        if quantity == 0 {
            return Some(0);
        }
        let quantity = Balance::from(quantity);
        let sold = Balance::from(units_sold);

        // quantity * (quantity - 1) is always even.
        let triangle = quantity.checked_mul(quantity - 1)? / 2;
        let steps = quantity.checked_mul(sold)?.checked_add(triangle)?;

        quantity
            .checked_mul(base_price)?
            .checked_add(increment.checked_mul(steps)?)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        const BASE: Balance = 43_000_000_000_000_000;
        const INCREMENT: Balance = 1_700_000_000_000_000;

        #[test]
        fn unit_price_follows_units_sold() {
            assert_eq!(unit_price(BASE, INCREMENT, 0), Some(BASE));
            assert_eq!(unit_price(BASE, INCREMENT, 1), Some(44_700_000_000_000_000));
            assert_eq!(unit_price(BASE, INCREMENT, 2), Some(46_400_000_000_000_000));
        }

        #[test]
        fn unit_price_with_zero_increment_is_flat() {
            assert_eq!(unit_price(BASE, 0, 1_000_000), Some(BASE));
        }

        #[test]
        fn unit_price_reports_overflow() {
            assert_eq!(unit_price(Balance::MAX, 1, 1), None);
            assert_eq!(unit_price(0, Balance::MAX, 2), None);
        }

        #[test]
        fn batch_cost_matches_summed_unit_prices() {
            for sold in [0u64, 1, 3, 9] {
                for quantity in [0u64, 1, 2, 3, 10] {
                    let expected: Balance = (sold..sold + quantity)
                        .map(|i| unit_price(BASE, INCREMENT, i).unwrap())
                        .sum();
                    assert_eq!(
                        batch_cost(BASE, INCREMENT, sold, quantity),
                        Some(expected),
                        "sold={sold} quantity={quantity}"
                    );
                }
            }
        }

        #[test]
        fn batch_cost_reports_overflow() {
            assert_eq!(batch_cost(Balance::MAX, 0, 0, 2), None);
            assert_eq!(batch_cost(0, Balance::MAX, 0, 3), None);
        }
    }
}

/// # Redeemable Shop
///
/// **Role:** Catalog and sale ledger for redeemable species. Each species is
/// sold on a linear price curve that rises by `increment` after every paid
/// purchase; giveaways hand out units without moving the curve.
///
/// **Roles:**
/// ```text
///   owner (CLevel) ── create / set_* / pause / unpause / set_cfo
///   cfo            ── giveaway_redeemable, receives every sale price
///   anyone         ── buy_redeemable (payable), views
/// ```
///
/// Overpayment is refunded to the buyer in the same call; the contract
/// never keeps funds between calls.
#[ink::contract]
mod redeemable_shop {
    use super::*;
    use crate::constants::MILLIS_PER_SECOND;
    use ink::storage::Mapping;

    // =========================================================================
    // TYPES
    // =========================================================================

    /// One catalog entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, scale::Encode, scale::Decode)]
    #[cfg_attr(
        feature = "std",
        derive(scale_info::TypeInfo, ink::storage::traits::StorageLayout)
    )]
    pub struct Redeemable {
        pub id: RedeemableId,
        pub base_price: Balance,
        pub increment: Balance,
        /// Paid purchases only; giveaways are not counted.
        pub num_units_sold: u64,
        /// Unix seconds. Buying is rejected once "now" is past this.
        pub max_buy_date: u64,
        /// Unix seconds.
        pub redeem_date: u64,
    }

    impl Redeemable {
        pub fn current_price(&self) -> Option<Balance> {
            pricing::unit_price(self.base_price, self.increment, self.num_units_sold)
        }
    }

    /// Which parameter a `RedeemableUpdated` event refers to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, scale::Encode, scale::Decode)]
    #[cfg_attr(feature = "std", derive(scale_info::TypeInfo))]
    pub enum RedeemableField {
        BasePrice,
        Increment,
        MaxBuyDate,
        RedeemDate,
    }

    // =========================================================================
    // STORAGE
    // =========================================================================

    #[ink(storage)]
    pub struct RedeemableShop {
        /// CLevel account.
        owner: AccountId,
        cfo: AccountId,
        paused: bool,

        /// Next free id; ids `0..num_redeemable` are all present.
        num_redeemable: RedeemableId,
        redeemables: Mapping<RedeemableId, Redeemable>,

        /// (owner, species) -> units held.
        owned: Mapping<(AccountId, RedeemableId), u64>,

        redeem_logic: Option<AccountId>,
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    #[ink(event)]
    pub struct RedeemableCreated {
        #[ink(topic)]
        id: RedeemableId,
        base_price: Balance,
        increment: Balance,
        max_buy_date: u64,
        redeem_date: u64,
    }

    /// Emitted by every parameter setter. Dates are widened to `u128`.
    #[ink(event)]
    pub struct RedeemableUpdated {
        #[ink(topic)]
        id: RedeemableId,
        field: RedeemableField,
        value: u128,
    }

    #[ink(event)]
    pub struct RedeemableBought {
        #[ink(topic)]
        id: RedeemableId,
        #[ink(topic)]
        buyer: AccountId,
        price: Balance,
        refund: Balance,
        num_units_sold: u64,
    }

    #[ink(event)]
    pub struct RedeemableGivenAway {
        #[ink(topic)]
        id: RedeemableId,
        #[ink(topic)]
        receiver: AccountId,
        quantity: u64,
    }

    #[ink(event)]
    pub struct CfoChanged {
        #[ink(topic)]
        previous: AccountId,
        #[ink(topic)]
        new: AccountId,
    }

    #[ink(event)]
    pub struct OwnershipTransferred {
        #[ink(topic)]
        previous: AccountId,
        #[ink(topic)]
        new: AccountId,
    }

    #[ink(event)]
    pub struct Paused {
        by: AccountId,
    }

    #[ink(event)]
    pub struct Unpaused {
        by: AccountId,
    }

    #[ink(event)]
    pub struct RedeemLogicChanged {
        #[ink(topic)]
        logic: AccountId,
    }

    // =========================================================================
    // ERRORS
    // =========================================================================

    #[derive(Debug, PartialEq, Eq, scale::Encode, scale::Decode)]
    #[cfg_attr(feature = "std", derive(scale_info::TypeInfo))]
    pub enum Error {
        /// Caller lacks the role the message requires.
        Unauthorized,
        /// No species with the given id.
        NotFound,
        /// `create_redeemable` was given an id other than `num_redeemable`.
        DuplicateOrNonSequentialId,
        ContractPaused,
        PastMaxBuyDate,
        /// Attached value is below the current price.
        InsufficientPayment,
        /// Giveaway quantity was zero.
        InvalidQuantity,
        /// Price or counter arithmetic overflowed.
        Overflow,
        /// A native value transfer to the CFO or the buyer failed.
        TransferFailed,
        /// The proposed redeem logic address is not a contract.
        NotRedeemLogic,
    }

    pub type Result<T> = core::result::Result<T, Error>;

    // =========================================================================
    // IMPLEMENTATION
    // =========================================================================

    impl RedeemableShop {
        /// The deployer becomes both owner and CFO.
        #[ink(constructor)]
        pub fn new() -> Self {
            let caller = Self::env().caller();
            Self {
                owner: caller,
                cfo: caller,
                paused: false,
                num_redeemable: 0,
                redeemables: Mapping::default(),
                owned: Mapping::default(),
                redeem_logic: None,
            }
        }

        // =====================================================================
        // CATALOG
        // =====================================================================

        /// Append a species to the catalog.
        ///
        /// `id` must equal the current `num_redeemable`, so ids stay
        /// contiguous and a second call with the same id is refused.
        #[ink(message)]
        pub fn create_redeemable(
            &mut self,
            id: RedeemableId,
            base_price: Balance,
            increment: Balance,
            max_buy_date: u64,
            redeem_date: u64,
        ) -> Result<()> {
            self.only_owner()?;

            if id != self.num_redeemable {
                return Err(Error::DuplicateOrNonSequentialId);
            }
            let next = self.num_redeemable.checked_add(1).ok_or(Error::Overflow)?;

            self.redeemables.insert(
                id,
                &Redeemable {
                    id,
                    base_price,
                    increment,
                    num_units_sold: 0,
                    max_buy_date,
                    redeem_date,
                },
            );
            self.num_redeemable = next;

            self.env().emit_event(RedeemableCreated {
                id,
                base_price,
                increment,
                max_buy_date,
                redeem_date,
            });

            Ok(())
        }

        #[ink(message)]
        pub fn get_redeemable(&self, id: RedeemableId) -> Result<Redeemable> {
            self.load(id)
        }

        #[ink(message)]
        pub fn num_redeemable(&self) -> RedeemableId {
            self.num_redeemable
        }

        // =====================================================================
        // PRICING
        // =====================================================================

        /// Price of the next unit, recomputed from the stored parameters.
        #[ink(message)]
        pub fn redeem_price(&self, id: RedeemableId) -> Result<Balance> {
            self.load(id)?.current_price().ok_or(Error::Overflow)
        }

        /// Total cost of buying `quantity` more units one after another at
        /// the current parameters.
        #[ink(message)]
        pub fn quote(&self, id: RedeemableId, quantity: u64) -> Result<Balance> {
            let r = self.load(id)?;
            pricing::batch_cost(r.base_price, r.increment, r.num_units_sold, quantity)
                .ok_or(Error::Overflow)
        }

        #[ink(message)]
        pub fn set_base_price(&mut self, id: RedeemableId, base_price: Balance) -> Result<()> {
            self.update(id, RedeemableField::BasePrice, base_price, |r| {
                r.base_price = base_price
            })
        }

        #[ink(message)]
        pub fn set_increment(&mut self, id: RedeemableId, increment: Balance) -> Result<()> {
            self.update(id, RedeemableField::Increment, increment, |r| {
                r.increment = increment
            })
        }

        #[ink(message)]
        pub fn set_max_buy_date(&mut self, id: RedeemableId, max_buy_date: u64) -> Result<()> {
            self.update(id, RedeemableField::MaxBuyDate, max_buy_date.into(), |r| {
                r.max_buy_date = max_buy_date
            })
        }

        #[ink(message)]
        pub fn set_redeem_date(&mut self, id: RedeemableId, redeem_date: u64) -> Result<()> {
            self.update(id, RedeemableField::RedeemDate, redeem_date.into(), |r| {
                r.redeem_date = redeem_date
            })
        }

        fn update(
            &mut self,
            id: RedeemableId,
            field: RedeemableField,
            value: u128,
            apply: impl FnOnce(&mut Redeemable),
        ) -> Result<()> {
            self.only_owner()?;
            let mut redeemable = self.load(id)?;
            apply(&mut redeemable);
            self.redeemables.insert(id, &redeemable);

            self.env().emit_event(RedeemableUpdated { id, field, value });
            Ok(())
        }

        // =====================================================================
        // PURCHASE SETTLEMENT
        // =====================================================================

        /// Buy one unit of species `id` with the attached value.
        ///
        /// Exactly the current price goes to the CFO and whatever was paid
        /// on top is sent back to the caller. Returns the price charged.
        ///
        /// All checks run before the first transfer; if a transfer fails the
        /// message returns `Err` and the call is reverted as a whole.
        #[ink(message, payable)]
        pub fn buy_redeemable(&mut self, id: RedeemableId) -> Result<Balance> {
            self.assert_not_paused()?;

            let mut redeemable = self.load(id)?;
            if self.now_seconds() > redeemable.max_buy_date {
                return Err(Error::PastMaxBuyDate);
            }

            let price = redeemable.current_price().ok_or(Error::Overflow)?;
            let paid = self.env().transferred_value();
            if paid < price {
                return Err(Error::InsufficientPayment);
            }
            let refund = paid - price;

            let buyer = self.env().caller();
            let owned = self
                .num_owned_redeemable(buyer, id)
                .checked_add(1)
                .ok_or(Error::Overflow)?;
            redeemable.num_units_sold = redeemable
                .num_units_sold
                .checked_add(1)
                .ok_or(Error::Overflow)?;

            if price > 0 {
                self.env()
                    .transfer(self.cfo, price)
                    .map_err(|_| Error::TransferFailed)?;
            }
            if refund > 0 {
                self.env()
                    .transfer(buyer, refund)
                    .map_err(|_| Error::TransferFailed)?;
            }

            self.redeemables.insert(id, &redeemable);
            self.owned.insert((buyer, id), &owned);

            self.env().emit_event(RedeemableBought {
                id,
                buyer,
                price,
                refund,
                num_units_sold: redeemable.num_units_sold,
            });

            Ok(price)
        }

        // =====================================================================
        // GIVEAWAY
        // =====================================================================

        /// Credit `quantity` units of `id` to `receiver` free of charge.
        /// The price curve does not move.
        #[ink(message)]
        pub fn giveaway_redeemable(
            &mut self,
            id: RedeemableId,
            quantity: u64,
            receiver: AccountId,
        ) -> Result<()> {
            self.assert_not_paused()?;
            self.only_cfo()?;

            if quantity == 0 {
                return Err(Error::InvalidQuantity);
            }
            self.load(id)?;

            let owned = self
                .num_owned_redeemable(receiver, id)
                .checked_add(quantity)
                .ok_or(Error::Overflow)?;
            self.owned.insert((receiver, id), &owned);

            self.env().emit_event(RedeemableGivenAway {
                id,
                receiver,
                quantity,
            });

            Ok(())
        }

        #[ink(message)]
        pub fn num_owned_redeemable(&self, owner: AccountId, id: RedeemableId) -> u64 {
            self.owned.get((owner, id)).unwrap_or(0)
        }

        // =====================================================================
        // REDEEM LOGIC
        // =====================================================================

        #[ink(message)]
        pub fn redeem_logic(&self) -> Option<AccountId> {
            self.redeem_logic
        }

        /// Point the shop at the contract that will handle redemption.
        /// Plain accounts are refused.
        #[ink(message)]
        pub fn set_redeem_logic(&mut self, logic: AccountId) -> Result<()> {
            self.only_owner()?;
            if !self.env().is_contract(&logic) {
                return Err(Error::NotRedeemLogic);
            }
            self.redeem_logic = Some(logic);
            self.env().emit_event(RedeemLogicChanged { logic });
            Ok(())
        }

        // =====================================================================
        // ADMIN
        // =====================================================================

        #[ink(message)]
        pub fn set_cfo(&mut self, cfo: AccountId) -> Result<()> {
            self.only_owner()?;
            let previous = self.cfo;
            self.cfo = cfo;
            self.env().emit_event(CfoChanged { previous, new: cfo });
            Ok(())
        }

        #[ink(message)]
        pub fn transfer_ownership(&mut self, new_owner: AccountId) -> Result<()> {
            self.only_owner()?;
            let previous = self.owner;
            self.owner = new_owner;
            self.env().emit_event(OwnershipTransferred {
                previous,
                new: new_owner,
            });
            Ok(())
        }

        #[ink(message)]
        pub fn pause(&mut self) -> Result<()> {
            self.only_owner()?;
            if !self.paused {
                self.paused = true;
                self.env().emit_event(Paused {
                    by: self.env().caller(),
                });
            }
            Ok(())
        }

        #[ink(message)]
        pub fn unpause(&mut self) -> Result<()> {
            self.only_owner()?;
            if self.paused {
                self.paused = false;
                self.env().emit_event(Unpaused {
                    by: self.env().caller(),
                });
            }
            Ok(())
        }

        // =====================================================================
        // VIEW FUNCTIONS
        // =====================================================================

        #[ink(message)]
        pub fn is_paused(&self) -> bool {
            self.paused
        }

        #[ink(message)]
        pub fn cfo(&self) -> AccountId {
            self.cfo
        }

        #[ink(message)]
        pub fn owner(&self) -> AccountId {
            self.owner
        }

        // =====================================================================
        // INTERNAL
        // =====================================================================

        fn load(&self, id: RedeemableId) -> Result<Redeemable> {
            self.redeemables.get(id).ok_or(Error::NotFound)
        }

        fn now_seconds(&self) -> u64 {
            self.env().block_timestamp() / MILLIS_PER_SECOND
        }

        // =====================================================================
        // ACCESS CONTROL
        // =====================================================================

        fn only_owner(&self) -> Result<()> {
            if self.env().caller() != self.owner {
                return Err(Error::Unauthorized);
            }
            Ok(())
        }

        fn only_cfo(&self) -> Result<()> {
            if self.env().caller() != self.cfo {
                return Err(Error::Unauthorized);
            }
            Ok(())
        }

        fn assert_not_paused(&self) -> Result<()> {
            if self.paused {
                return Err(Error::ContractPaused);
            }
            Ok(())
        }
    }

    // =========================================================================
    // UNIT TESTS
    // =========================================================================

}
