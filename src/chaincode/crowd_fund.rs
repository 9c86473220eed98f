use super::{Chaincode, ChaincodeError, ChaincodeResult, ChaincodeStub, parse_int};

/// Donation account: `init(account, value)` opens it, `invoke(account,
/// amount)` adds to it and `query("query", [account])` reads it.
pub struct CrowdFundChaincode;

impl Chaincode for CrowdFundChaincode {
    fn init(&self, stub: &mut ChaincodeStub, _function: &str, args: &[String]) -> ChaincodeResult {
        let [account, value] = args else {
            return Err(ChaincodeError::new(
                "Incorrect number of arguments. Expecting 2.",
            ));
        };
        let value = parse_int(
            value.as_bytes(),
            "Expecting integer value for account initialization.",
        )?;
        stub.put_state(account, value.to_string().into_bytes());
        Ok(vec![])
    }

    fn invoke(&self, stub: &mut ChaincodeStub, _function: &str, args: &[String]) -> ChaincodeResult {
        let [account, amount] = args else {
            return Err(ChaincodeError::new(
                "Incorrect number of arguments. Expecting 2.",
            ));
        };
        let current = stub
            .get_state(account)
            .ok_or_else(|| ChaincodeError::new("Entity not found!"))?;
        let current = parse_int(current, "Failed to get account state.")?;
        let amount = parse_int(
            amount.as_bytes(),
            "Invalid transaction amount, expecting a integer value.",
        )?;

        let balance = current.checked_add(amount).ok_or_else(|| {
            ChaincodeError::new("Transaction amount overflows the account balance.")
        })?;

        stub.put_state(account, balance.to_string().into_bytes());
        Ok(vec![])
    }

    fn query(&self, stub: &ChaincodeStub, function: &str, args: &[String]) -> ChaincodeResult {
        if function != "query" {
            return Err(ChaincodeError::new(
                "Invalid query function name. Expecting \"query\".",
            ));
        }
        let [account] = args else {
            return Err(ChaincodeError::new(
                "Incorrect number of arguments. Expecting name of the state variable to query.",
            ));
        };
        stub.get_state(account)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| ChaincodeError::new(format!("{{\"Error\":\"Nil amount for {}\"}}", account)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn donations_accumulate() {
        let cc = CrowdFundChaincode;
        let mut stub = ChaincodeStub::default();
        cc.init(&mut stub, "init", &["account".into(), "0".into()]).unwrap();

        cc.invoke(&mut stub, "invoke", &["account".into(), "25".into()]).unwrap();
        cc.invoke(&mut stub, "invoke", &["account".into(), "5".into()]).unwrap();

        assert_eq!(cc.query(&stub, "query", &["account".into()]).unwrap(), b"30");
    }

    #[test]
    fn reports_client_facing_error_messages() {
        let cc = CrowdFundChaincode;
        let mut stub = ChaincodeStub::default();

        assert_eq!(
            cc.invoke(&mut stub, "invoke", &["account".into(), "5".into()]),
            Err(ChaincodeError::new("Entity not found!"))
        );
        cc.init(&mut stub, "init", &["account".into(), "0".into()]).unwrap();
        assert_eq!(
            cc.invoke(&mut stub, "invoke", &["account".into(), "five".into()]),
            Err(ChaincodeError::new(
                "Invalid transaction amount, expecting a integer value."
            ))
        );
    }

    #[test]
    fn overflowing_donation_is_refused() {
        let cc = CrowdFundChaincode;
        let mut stub = ChaincodeStub::default();
        let max = i64::MAX.to_string();
        cc.init(&mut stub, "init", &["account".into(), max.clone()]).unwrap();

        assert!(cc.invoke(&mut stub, "invoke", &["account".into(), "1".into()]).is_err());
        assert_eq!(
            cc.query(&stub, "query", &["account".into()]).unwrap(),
            max.as_bytes()
        );
    }
}
