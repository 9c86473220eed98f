use super::{Chaincode, ChaincodeError, ChaincodeResult, ChaincodeStub, parse_int};

/// Two-entity asset transfer.
///
/// `init(A, Aval, B, Bval)` creates both entities, `invoke(A, B, X)` moves
/// X units from A to B, `invoke` with function `delete` removes an entity,
/// and `query("query", [name])` returns an entity's holding.
pub struct Example02Chaincode;

impl Example02Chaincode {
    fn holding(stub: &ChaincodeStub, entity: &str) -> Result<i64, ChaincodeError> {
        let raw = stub
            .get_state(entity)
            .ok_or_else(|| ChaincodeError::new("Entity not found"))?;
        parse_int(raw, "Failed to get state")
    }
}

impl Chaincode for Example02Chaincode {
    fn init(&self, stub: &mut ChaincodeStub, _function: &str, args: &[String]) -> ChaincodeResult {
        let [a, a_val, b, b_val] = args else {
            return Err(ChaincodeError::new(
                "Incorrect number of arguments. Expecting 4",
            ));
        };
        let expecting = "Expecting integer value for asset holding";
        let a_val = parse_int(a_val.as_bytes(), expecting)?;
        let b_val = parse_int(b_val.as_bytes(), expecting)?;

        stub.put_state(a, a_val.to_string().into_bytes());
        stub.put_state(b, b_val.to_string().into_bytes());
        Ok(vec![])
    }

    fn invoke(&self, stub: &mut ChaincodeStub, function: &str, args: &[String]) -> ChaincodeResult {
        if function == "delete" {
            let [entity] = args else {
                return Err(ChaincodeError::new(
                    "Incorrect number of arguments. Expecting 1",
                ));
            };
            stub.del_state(entity);
            return Ok(vec![]);
        }

        let [a, b, x] = args else {
            return Err(ChaincodeError::new(
                "Incorrect number of arguments. Expecting 3",
            ));
        };
        let a_val = Self::holding(stub, a)?;
        let b_val = Self::holding(stub, b)?;
        let x = parse_int(
            x.as_bytes(),
            "Invalid transaction amount, expecting a integer value",
        )?;

        let (Some(a_val), Some(b_val)) = (a_val.checked_sub(x), b_val.checked_add(x)) else {
            return Err(ChaincodeError::new(
                "Transaction amount overflows an asset holding",
            ));
        };

        stub.put_state(a, a_val.to_string().into_bytes());
        stub.put_state(b, b_val.to_string().into_bytes());
        Ok(vec![])
    }

    fn query(&self, stub: &ChaincodeStub, function: &str, args: &[String]) -> ChaincodeResult {
        if function != "query" {
            return Err(ChaincodeError::new(
                "Invalid query function name. Expecting \"query\"",
            ));
        }
        let [entity] = args else {
            return Err(ChaincodeError::new(
                "Incorrect number of arguments. Expecting name of the person to query",
            ));
        };
        stub.get_state(entity)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| ChaincodeError::new(format!("{{\"Error\":\"Nil amount for {}\"}}", entity)))
    }
}
