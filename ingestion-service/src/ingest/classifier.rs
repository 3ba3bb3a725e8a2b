//! Keyword categorization of statement descriptions.
//!
//! Rules are evaluated in table order against the uppercased description and
//! the first rule with a matching keyword wins, so more specific merchants
//! must precede the generic words they contain.

use crate::models::FinanceCategory;

/// Keywords mapped to the coarse category path, e.g. `["Food and Drink", "Coffee"]`.
pub struct PathRule {
    pub keywords: &'static [&'static str],
    pub path: &'static [&'static str],
}

/// Keywords mapped to the structured finance category code.
pub struct FinanceRule {
    pub keywords: &'static [&'static str],
    pub primary: &'static str,
    pub detailed: &'static str,
}

const fn path_rule(keywords: &'static [&'static str], path: &'static [&'static str]) -> PathRule {
    PathRule { keywords, path }
}

const fn finance_rule(
    keywords: &'static [&'static str],
    primary: &'static str,
    detailed: &'static str,
) -> FinanceRule {
    FinanceRule {
        keywords,
        primary,
        detailed,
    }
}

fn first_match<'a, R>(
    rules: &'a [R],
    keywords: impl Fn(&R) -> &'static [&'static str],
    upper: &str,
) -> Option<&'a R> {
    rules
        .iter()
        .find(|rule| keywords(rule).iter().any(|keyword| upper.contains(keyword)))
}

pub const DEFAULT_PATH: &[&str] = &["Other"];
pub const DEFAULT_PRIMARY: &str = "GENERAL_SERVICES";
pub const DEFAULT_DETAILED: &str = "GENERAL_SERVICES_OTHER";

pub static PATH_RULES: &[PathRule] = &[
    // Food and drink
    path_rule(
        &["STARBUCKS", "TIM HORTONS", "TIMHORTONS", "COFFEE", "CAFE", "ESPRESSO", "LATTE"],
        &["Food and Drink", "Coffee"],
    ),
    path_rule(
        &["PIZZA", "DOMINO", "PIZZA HUT", "PIZZAHUT", "LITTLE CAESARS", "PAPA JOHNS"],
        &["Food and Drink", "Restaurants", "Pizza"],
    ),
    path_rule(
        &["MCDONALD", "BURGER KING", "WENDY", "A&W", "HARVEY", "IN-N-OUT", "FIVE GUYS"],
        &["Food and Drink", "Restaurants", "Fast Food"],
    ),
    path_rule(
        &["RESTAURANT", "DINER", "BISTRO", "GRILL", "CHICK-FIL-A", "SUBWAY", "TACO BELL", "KFC"],
        &["Food and Drink", "Restaurants"],
    ),
    path_rule(
        &["UBER EATS", "DOORDASH", "SKIP", "GRUBHUB", "FOOD DELIVERY"],
        &["Food and Drink", "Restaurants", "Food Delivery"],
    ),
    path_rule(
        &[
            "FOOD BASICS", "ZEHRS", "LOBLAWS", "METRO", "NO FRILLS", "GROCERY", "SUPERSTORE",
            "SAFEWAY", "WHOLE FOODS", "TRADER JOE",
        ],
        &["Food and Drink", "Groceries"],
    ),
    path_rule(
        &["LCBO", "BEER STORE", "WINE", "LIQUOR", "ALCOHOL"],
        &["Food and Drink", "Alcohol"],
    ),
    // Transportation
    path_rule(
        &["UBER", "LYFT", "TAXI", "CAB", "RIDE SHARE"],
        &["Transportation", "Ride Share"],
    ),
    path_rule(
        &[
            "SHELL", "PETRO", "ESSO", "MOBIL", "GAS", "PETRO-CANADA", "SUNOCO", "CHEVRON", "BP",
            "EXXON",
        ],
        &["Transportation", "Gas"],
    ),
    path_rule(
        &["PARKING", "PARKING METER", "IMPARK", "INDIGO PARKING"],
        &["Transportation", "Parking"],
    ),
    path_rule(
        &["TTC", "GO TRANSIT", "TRANSIT", "METRO", "SUBWAY", "BUS", "TRAIN", "VIA RAIL"],
        &["Transportation", "Public Transit"],
    ),
    path_rule(
        &["AIRPORT", "AIR CANADA", "WESTJET", "AIRLINE", "FLIGHT"],
        &["Transportation", "Air Travel"],
    ),
    // Shopping
    path_rule(
        &["WALMART", "TARGET", "COSTCO", "DOLLARAMA", "DOLLAR TREE"],
        &["Shopping", "General Merchandise"],
    ),
    path_rule(
        &["AMAZON", "AMZN"],
        &["Shopping", "Online Shopping"],
    ),
    path_rule(
        &["BEST BUY", "FUTURE SHOP", "ELECTRONICS"],
        &["Shopping", "Electronics"],
    ),
    path_rule(
        &["HOME DEPOT", "LOWES", "RONA", "CANADIAN TIRE", "HARDWARE"],
        &["Shopping", "Home Improvement"],
    ),
    path_rule(
        &["CLOTHING", "H&M", "ZARA", "OLD NAVY", "GAP", "NORDSTROM", "MACY"],
        &["Shopping", "Clothing"],
    ),
    path_rule(
        &["PHARMACY", "SHOPPERS", "REXALL", "WALGREENS", "CVS"],
        &["Shopping", "Pharmacy"],
    ),
    // Recreation and entertainment
    path_rule(
        &["GOODLIFE", "GYM", "FITNESS", "YMCA", "FITNESS WORLD", "ORANGETHEORY"],
        &["Recreation", "Fitness"],
    ),
    path_rule(
        &["NETFLIX", "SPOTIFY", "DISNEY", "APPLE MUSIC", "PRIME VIDEO", "HULU"],
        &["Recreation", "Entertainment", "Streaming"],
    ),
    path_rule(
        &["MOVIE", "CINEMA", "CINEPLEX", "AMC", "THEATRE"],
        &["Recreation", "Entertainment", "Movies"],
    ),
    path_rule(
        &["CONCERT", "TICKETMASTER", "EVENT", "SHOW"],
        &["Recreation", "Entertainment", "Events"],
    ),
    path_rule(
        &["GOLF", "TENNIS", "SPORTS", "RECREATION"],
        &["Recreation", "Sports"],
    ),
    // Bills and utilities
    path_rule(
        &["HYDRO", "ELECTRIC", "POWER", "ENERGY"],
        &["Bills", "Utilities", "Electric"],
    ),
    path_rule(
        &["GAS BILL", "NATURAL GAS", "ENBRIDGE"],
        &["Bills", "Utilities", "Gas"],
    ),
    path_rule(
        &["WATER", "WATER BILL"],
        &["Bills", "Utilities", "Water"],
    ),
    path_rule(
        &["ROGERS", "BELL", "TELUS", "FIDO", "VIRGIN", "CELL", "PHONE", "MOBILE"],
        &["Bills", "Utilities", "Phone"],
    ),
    path_rule(
        &["INTERNET", "CABLE", "TV", "SHAW", "COGECO"],
        &["Bills", "Utilities", "Internet/Cable"],
    ),
    path_rule(
        &["INSURANCE", "AUTO INSURANCE", "HOME INSURANCE"],
        &["Bills", "Insurance"],
    ),
    path_rule(
        &["RENT", "LEASE", "LANDLORD"],
        &["Bills", "Housing", "Rent"],
    ),
    path_rule(
        &["MORTGAGE", "HOME LOAN"],
        &["Bills", "Housing", "Mortgage"],
    ),
    path_rule(
        &["PROPERTY TAX", "TAXES"],
        &["Bills", "Taxes"],
    ),
    // Payments and transfers
    path_rule(
        &["VISA", "MASTERCARD", "AMEX", "CREDIT CARD", "PAYMENT"],
        &["Payment", "Credit Card"],
    ),
    path_rule(
        &["E-TRANSFER", "E-TFR", "INTERAC", "E-TRANS"],
        &["Transfer"],
    ),
    // Bank
    path_rule(
        &["ATM", "BANK MACHINE", "WITHDRAWAL"],
        &["Bank Fees", "ATM"],
    ),
    path_rule(
        &["BANK FEE", "SERVICE CHARGE", "MONTHLY FEE"],
        &["Bank Fees"],
    ),
    path_rule(
        &["INTEREST", "INTEREST PAYMENT"],
        &["Financial", "Interest"],
    ),
    // Health
    path_rule(
        &["PHARMACY", "DRUG", "PRESCRIPTION", "MEDICATION"],
        &["Healthcare", "Pharmacy"],
    ),
    path_rule(
        &["DENTIST", "DENTAL", "ORTHODONTIST"],
        &["Healthcare", "Dental"],
    ),
    path_rule(
        &["DOCTOR", "CLINIC", "HOSPITAL", "MEDICAL", "PHYSICIAN"],
        &["Healthcare", "Medical"],
    ),
    path_rule(
        &["VET", "VETERINARY", "PET CARE"],
        &["Healthcare", "Veterinary"],
    ),
    // Education
    path_rule(
        &["TUITION", "UNIVERSITY", "COLLEGE", "SCHOOL", "EDUCATION"],
        &["Education", "Tuition"],
    ),
    path_rule(
        &["BOOKSTORE", "TEXTBOOK", "COURSE"],
        &["Education", "Supplies"],
    ),
    // Income
    path_rule(
        &["PAYROLL", "SALARY", "PAYCHECK", "PAY", "EMPLOYMENT"],
        &["Income", "Salary"],
    ),
    path_rule(
        &["GST", "HST", "TAX REFUND", "TAX RETURN"],
        &["Income", "Tax Refund"],
    ),
    path_rule(
        &["DEPOSIT", "DEPOSIT FROM"],
        &["Income", "Deposit"],
    ),
    path_rule(
        &["DIVIDEND", "INTEREST INCOME"],
        &["Income", "Investment"],
    ),
    // Services
    path_rule(
        &["SUBSCRIPTION", "MONTHLY", "ANNUAL"],
        &["Services", "Subscription"],
    ),
    path_rule(
        &["SOFTWARE", "SAAS", "CLOUD"],
        &["Services", "Software"],
    ),
];

pub static FINANCE_RULES: &[FinanceRule] = &[
    // Food and drink
    finance_rule(
        &["STARBUCKS", "TIM HORTONS", "TIMHORTONS", "COFFEE", "CAFE", "ESPRESSO"],
        "FOOD_AND_DRINK",
        "FOOD_AND_DRINK_COFFEE_SHOPS",
    ),
    finance_rule(
        &["PIZZA", "DOMINO", "PIZZA HUT", "PIZZAHUT", "LITTLE CAESARS"],
        "FOOD_AND_DRINK",
        "FOOD_AND_DRINK_RESTAURANTS",
    ),
    finance_rule(
        &["MCDONALD", "BURGER KING", "WENDY", "A&W", "FAST FOOD"],
        "FOOD_AND_DRINK",
        "FOOD_AND_DRINK_FAST_FOOD",
    ),
    finance_rule(
        &["RESTAURANT", "DINER", "BISTRO", "GRILL", "CHICK-FIL-A", "SUBWAY", "TACO BELL"],
        "FOOD_AND_DRINK",
        "FOOD_AND_DRINK_RESTAURANTS",
    ),
    finance_rule(
        &["UBER EATS", "DOORDASH", "SKIP", "GRUBHUB", "FOOD DELIVERY"],
        "FOOD_AND_DRINK",
        "FOOD_AND_DRINK_RESTAURANTS",
    ),
    finance_rule(
        &[
            "FOOD BASICS", "ZEHRS", "LOBLAWS", "METRO", "NO FRILLS", "GROCERY", "SUPERSTORE",
            "SAFEWAY", "WHOLE FOODS",
        ],
        "FOOD_AND_DRINK",
        "FOOD_AND_DRINK_GROCERIES",
    ),
    finance_rule(
        &["LCBO", "BEER STORE", "WINE", "LIQUOR", "ALCOHOL"],
        "FOOD_AND_DRINK",
        "FOOD_AND_DRINK_ALCOHOL_AND_BARS",
    ),
    // Transportation
    finance_rule(
        &["UBER", "LYFT", "TAXI", "CAB", "RIDE SHARE"],
        "TRANSPORTATION",
        "TRANSPORTATION_TAXIS_AND_RIDE_SHARES",
    ),
    finance_rule(
        &[
            "SHELL", "PETRO", "ESSO", "MOBIL", "GAS", "PETRO-CANADA", "SUNOCO", "CHEVRON", "BP",
            "EXXON",
        ],
        "TRANSPORTATION",
        "TRANSPORTATION_GAS_STATIONS",
    ),
    finance_rule(
        &["PARKING", "PARKING METER", "IMPARK", "INDIGO PARKING"],
        "TRANSPORTATION",
        "TRANSPORTATION_PARKING",
    ),
    finance_rule(
        &["TTC", "GO TRANSIT", "TRANSIT", "METRO", "SUBWAY", "BUS", "TRAIN", "VIA RAIL"],
        "TRANSPORTATION",
        "TRANSPORTATION_PUBLIC_TRANSPORTATION",
    ),
    finance_rule(
        &["AIRPORT", "AIR CANADA", "WESTJET", "AIRLINE", "FLIGHT"],
        "TRANSPORTATION",
        "TRANSPORTATION_AIRLINES_AND_AVIATION_SERVICES",
    ),
    // Shopping
    finance_rule(
        &["WALMART", "TARGET", "COSTCO", "DOLLARAMA", "DOLLAR TREE"],
        "GENERAL_MERCHANDISE",
        "GENERAL_MERCHANDISE_SUPERSTORES",
    ),
    finance_rule(
        &["AMAZON", "AMZN"],
        "GENERAL_MERCHANDISE",
        "GENERAL_MERCHANDISE_ONLINE_MARKETPLACES",
    ),
    finance_rule(
        &["BEST BUY", "FUTURE SHOP", "ELECTRONICS"],
        "GENERAL_MERCHANDISE",
        "GENERAL_MERCHANDISE_ELECTRONICS",
    ),
    finance_rule(
        &["HOME DEPOT", "LOWES", "RONA", "CANADIAN TIRE", "HARDWARE"],
        "HOME_IMPROVEMENT",
        "HOME_IMPROVEMENT_HARDWARE_STORES",
    ),
    finance_rule(
        &["CLOTHING", "H&M", "ZARA", "OLD NAVY", "GAP", "NORDSTROM", "MACY"],
        "GENERAL_MERCHANDISE",
        "GENERAL_MERCHANDISE_CLOTHING_AND_ACCESSORIES",
    ),
    finance_rule(
        &["PHARMACY", "SHOPPERS", "REXALL", "WALGREENS", "CVS"],
        "GENERAL_MERCHANDISE",
        "GENERAL_MERCHANDISE_PHARMACIES",
    ),
    // Recreation and entertainment
    finance_rule(
        &["GOODLIFE", "GYM", "FITNESS", "YMCA", "FITNESS WORLD", "ORANGETHEORY"],
        "RECREATION",
        "RECREATION_GYMS_AND_FITNESS_CENTERS",
    ),
    finance_rule(
        &["NETFLIX", "SPOTIFY", "DISNEY", "APPLE MUSIC", "PRIME VIDEO", "HULU", "STREAMING"],
        "ENTERTAINMENT",
        "ENTERTAINMENT_MUSIC_AND_AUDIO",
    ),
    finance_rule(
        &["MOVIE", "CINEMA", "CINEPLEX", "AMC", "THEATRE"],
        "ENTERTAINMENT",
        "ENTERTAINMENT_MOVIES_AND_FILMS",
    ),
    finance_rule(
        &["CONCERT", "TICKETMASTER", "EVENT", "SHOW", "TICKETS"],
        "ENTERTAINMENT",
        "ENTERTAINMENT_MUSIC_AND_AUDIO",
    ),
    finance_rule(
        &["GOLF", "TENNIS", "SPORTS", "RECREATION"],
        "RECREATION",
        "RECREATION_SPORTS",
    ),
    // Bills and utilities
    finance_rule(
        &["HYDRO", "ELECTRIC", "POWER", "ENERGY"],
        "GENERAL_SERVICES",
        "GENERAL_SERVICES_UTILITIES_ELECTRIC",
    ),
    finance_rule(
        &["GAS BILL", "NATURAL GAS", "ENBRIDGE"],
        "GENERAL_SERVICES",
        "GENERAL_SERVICES_UTILITIES_GAS",
    ),
    finance_rule(
        &["WATER", "WATER BILL"],
        "GENERAL_SERVICES",
        "GENERAL_SERVICES_UTILITIES_WATER",
    ),
    finance_rule(
        &["ROGERS", "BELL", "TELUS", "FIDO", "VIRGIN", "CELL", "PHONE", "MOBILE"],
        "GENERAL_SERVICES",
        "GENERAL_SERVICES_TELECOMMUNICATION",
    ),
    finance_rule(
        &["INTERNET", "CABLE", "TV", "SHAW", "COGECO"],
        "GENERAL_SERVICES",
        "GENERAL_SERVICES_TELECOMMUNICATION",
    ),
    finance_rule(
        &["INSURANCE", "AUTO INSURANCE", "HOME INSURANCE"],
        "GENERAL_SERVICES",
        "GENERAL_SERVICES_INSURANCE",
    ),
    finance_rule(
        &["RENT", "LEASE", "LANDLORD"],
        "RENT_AND_UTILITIES",
        "RENT_AND_UTILITIES_RENT",
    ),
    finance_rule(
        &["MORTGAGE", "HOME LOAN"],
        "LOAN_PAYMENTS",
        "LOAN_PAYMENTS_MORTGAGE_PAYMENT",
    ),
    finance_rule(
        &["PROPERTY TAX", "TAXES"],
        "GENERAL_SERVICES",
        "GENERAL_SERVICES_ACCOUNTING_AND_FINANCIAL_PLANNING",
    ),
    // Payments and transfers
    finance_rule(
        &["VISA", "MASTERCARD", "AMEX", "CREDIT CARD", "TD VISA"],
        "LOAN_PAYMENTS",
        "LOAN_PAYMENTS_CREDIT_CARD_PAYMENT",
    ),
    finance_rule(
        &["E-TRANSFER", "E-TFR", "INTERAC", "E-TRANS"],
        "TRANSFER_OUT",
        "TRANSFER_OUT_ACCOUNT_TRANSFER",
    ),
    // Bank
    finance_rule(
        &["ATM", "BANK MACHINE", "WITHDRAWAL"],
        "BANK_FEES",
        "BANK_FEES_ATM_FEES",
    ),
    finance_rule(
        &["BANK FEE", "SERVICE CHARGE", "MONTHLY FEE"],
        "BANK_FEES",
        "BANK_FEES_OVERDRAFT_FEES",
    ),
    finance_rule(
        &["INTEREST", "INTEREST PAYMENT"],
        "GENERAL_SERVICES",
        "GENERAL_SERVICES_ACCOUNTING_AND_FINANCIAL_PLANNING",
    ),
    // Health
    finance_rule(
        &["PHARMACY", "DRUG", "PRESCRIPTION", "MEDICATION", "SHOPPERS", "REXALL"],
        "MEDICAL",
        "MEDICAL_PHARMACIES",
    ),
    finance_rule(
        &["DENTIST", "DENTAL", "ORTHODONTIST"],
        "MEDICAL",
        "MEDICAL_DENTAL_CARE",
    ),
    finance_rule(
        &["DOCTOR", "CLINIC", "HOSPITAL", "MEDICAL", "PHYSICIAN"],
        "MEDICAL",
        "MEDICAL_PRIMARY_CARE",
    ),
    finance_rule(
        &["VET", "VETERINARY", "PET CARE"],
        "GENERAL_SERVICES",
        "GENERAL_SERVICES_VETERINARY_SERVICES",
    ),
    // Education
    finance_rule(
        &["TUITION", "UNIVERSITY", "COLLEGE", "SCHOOL", "EDUCATION"],
        "GENERAL_SERVICES",
        "GENERAL_SERVICES_EDUCATION",
    ),
    finance_rule(
        &["BOOKSTORE", "TEXTBOOK", "COURSE"],
        "GENERAL_SERVICES",
        "GENERAL_SERVICES_EDUCATION",
    ),
    // Income
    finance_rule(
        &["PAYROLL", "SALARY", "PAYCHECK", "PAY", "EMPLOYMENT"],
        "INCOME",
        "INCOME_WAGES",
    ),
    finance_rule(
        &["GST", "HST", "TAX REFUND", "TAX RETURN"],
        "INCOME",
        "INCOME_TAX_REFUND",
    ),
    finance_rule(
        &["DEPOSIT", "DEPOSIT FROM"],
        "INCOME",
        "INCOME_OTHER_INCOME",
    ),
    finance_rule(
        &["DIVIDEND", "INTEREST INCOME"],
        "INCOME",
        "INCOME_DIVIDENDS",
    ),
    // Services
    finance_rule(
        &["SUBSCRIPTION", "MONTHLY", "ANNUAL"],
        "GENERAL_SERVICES",
        "GENERAL_SERVICES_SUBSCRIPTIONS",
    ),
    finance_rule(
        &["SOFTWARE", "SAAS", "CLOUD"],
        "GENERAL_SERVICES",
        "GENERAL_SERVICES_COMPUTER_AND_SOFTWARE",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: Vec<String>,
    pub personal_finance_category: FinanceCategory,
}

/// Maps a free-text description to its category labels.
pub trait Classifier: Send + Sync {
    fn classify(&self, description: &str) -> Classification;
}

/// First-match substring classifier. The coarse path and the finance code
/// come from separate tables, each matched independently, so a description
/// can resolve to a path from one rule and a code from a different one.
pub struct KeywordClassifier {
    paths: &'static [PathRule],
    finance: &'static [FinanceRule],
}

impl KeywordClassifier {
    pub fn new(paths: &'static [PathRule], finance: &'static [FinanceRule]) -> Self {
        Self { paths, finance }
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(PATH_RULES, FINANCE_RULES)
    }
}

impl Classifier for KeywordClassifier {
    fn classify(&self, description: &str) -> Classification {
        let upper = description.to_uppercase();

        let path = first_match(self.paths, |r| r.keywords, &upper)
            .map(|r| r.path)
            .unwrap_or(DEFAULT_PATH);
        let personal_finance_category = first_match(self.finance, |r| r.keywords, &upper)
            .map(|r| FinanceCategory::new(r.primary, r.detailed))
            .unwrap_or_else(|| FinanceCategory::new(DEFAULT_PRIMARY, DEFAULT_DETAILED));

        Classification {
            category: path.iter().map(|s| s.to_string()).collect(),
            personal_finance_category,
        }
    }
}
